use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::{ConvertError, Dialect, ProseConverter};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs the `pandoc` executable once per conversion.
#[derive(Debug, Clone)]
pub struct PandocConverter {
    program: String,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl PandocConverter {
    pub fn new(program: impl Into<String>, extra_args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            extra_args,
            timeout,
        }
    }

    fn format_name(dialect: Dialect) -> &'static str {
        match dialect {
            Dialect::Org => "org",
            Dialect::Markdown => "gfm",
        }
    }

    fn command(&self, from: Dialect, to: Dialect) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-f")
            .arg(Self::format_name(from))
            .arg("-t")
            .arg(Self::format_name(to))
            .arg("--wrap=none")
            .args(&self.extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

impl ProseConverter for PandocConverter {
    fn name(&self) -> &'static str {
        "pandoc"
    }

    fn convert(&self, text: &str, from: Dialect, to: Dialect) -> Result<String, ConvertError> {
        let mut child = self
            .command(from, to)
            .spawn()
            .map_err(|source| ConvertError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Pipes are serviced on their own threads so a large document cannot
        // deadlock on a full buffer.
        let mut stdin = child.stdin.take().ok_or(ConvertError::WorkerLost)?;
        let input = text.to_string();
        let writer = thread::spawn(move || stdin.write_all(input.as_bytes()));
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = match wait_with_deadline(&mut child, self.timeout)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(program = %self.program, timeout = ?self.timeout, "killed converter");
                return Err(ConvertError::Timeout(self.timeout));
            }
        };

        let _ = writer.join();
        let stdout = stdout.join().map_err(|_| ConvertError::WorkerLost)??;
        let stderr = stderr.join().map_err(|_| ConvertError::WorkerLost)??;

        if !status.success() {
            return Err(ConvertError::Failed {
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    source: Option<R>,
) -> thread::JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            source.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> Result<Option<std::process::ExitStatus>, ConvertError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
