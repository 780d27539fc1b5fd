use std::{io, process::ExitStatus, time::Duration};

use tokio::{process::Child, time};

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        /// Send SIGTERM. Returns `false` if the child has already been reaped.
        fn terminate(child: &Child) -> bool {
            let Some(pid) = child.id().and_then(|id| libc::pid_t::try_from(id).ok()) else {
                return false;
            };
            // SAFETY: plain syscall on a pid we spawned and have not reaped yet.
            unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
        }

        fn signal_of(status: &ExitStatus) -> Option<i32> {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        }
    } else {
        fn terminate(_: &Child) -> bool {
            false
        }

        fn signal_of(_: &ExitStatus) -> Option<i32> {
            None
        }
    }
}

/// Ask the child to stop, then force it after `grace`. Returns the exit status.
pub async fn kill_graceful(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if terminate(child) {
        if let Ok(status) = time::timeout(grace, child.wait()).await {
            return status;
        }
    }
    child.kill().await?;
    child.wait().await
}

/// Human-readable exit reason for logs.
pub fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {code}");
    }
    match signal_of(status) {
        Some(signal) => format!("signal {signal}"),
        None => "unknown".to_string(),
    }
}
