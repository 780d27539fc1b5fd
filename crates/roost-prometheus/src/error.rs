use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("metrics output is not utf-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}
