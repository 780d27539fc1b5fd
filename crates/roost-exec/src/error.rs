use roost_core::LinkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("executable not found: {0}")]
    MissingExecutable(String),
    #[error("invalid spawner config: {0}")]
    InvalidConfig(String),
    #[error("no free port in {start}..={end}")]
    PortsExhausted { start: u16, end: u16 },
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("master link: {0}")]
    Link(#[from] LinkError),
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}
