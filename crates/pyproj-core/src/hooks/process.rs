use std::io;

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Child,
};
use tracing::debug;

use crate::config::HookOutput;

const TRUNCATED_MARKER: &str = "\n[...truncated...]\n";

#[derive(Debug, Clone)]
pub(crate) struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Drain both output pipes of `child`, then wait for it to exit.
///
/// Dropping the returned future drops the child, which kills it when the
/// command was configured with `kill_on_drop`.
pub(crate) async fn wait_with_output(
    mut child: Child,
    output: HookOutput,
    limit: usize,
) -> io::Result<RunOutput> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("stdout missing for hook process"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("stderr missing for hook process"))?;

    let (stdout, stderr) = tokio::join!(
        read_limited(stdout, "stdout", output, limit),
        read_limited(stderr, "stderr", output, limit),
    );
    let status = child.wait().await?;
    Ok(RunOutput {
        code: status.code().unwrap_or(-1),
        stdout: stdout?,
        stderr: stderr?,
    })
}

async fn read_limited(
    reader: impl AsyncRead + Unpin,
    stream: &'static str,
    output: HookOutput,
    limit: usize,
) -> io::Result<String> {
    let mut segments = BufReader::new(reader).split(b'\n');
    let mut buffer = Vec::new();
    let mut truncated = false;
    while let Some(segment) = segments.next_segment().await? {
        let line = segment.strip_suffix(b"\r").unwrap_or(&segment);
        match output {
            HookOutput::Capture => debug!(stream, "{}", String::from_utf8_lossy(line)),
            HookOutput::Stream => eprintln!("{}", String::from_utf8_lossy(line)),
            HookOutput::Quiet => {}
        }
        append_limited(&mut buffer, line, limit, &mut truncated);
        append_limited(&mut buffer, b"\n", limit, &mut truncated);
    }
    let mut text = String::from_utf8_lossy(&buffer).into_owned();
    if truncated {
        text.push_str(TRUNCATED_MARKER);
    }
    Ok(text)
}

/// Keep the newest `limit` bytes.
fn append_limited(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize, truncated: &mut bool) {
    if limit == 0 {
        return;
    }
    if buffer.len().saturating_add(chunk.len()) <= limit {
        buffer.extend_from_slice(chunk);
        return;
    }
    *truncated = true;
    let old_len = buffer.len();
    let excess = old_len.saturating_add(chunk.len()).saturating_sub(limit);
    if excess >= old_len {
        buffer.clear();
        let drop_from_chunk = excess.saturating_sub(old_len).min(chunk.len());
        buffer.extend_from_slice(&chunk[drop_from_chunk..]);
    } else {
        buffer.drain(0..excess);
        buffer.extend_from_slice(chunk);
    }
}

#[cfg(test)]
mod tests {
    use std::process::Stdio;

    use tokio::process::Command;

    use super::*;

    #[test]
    fn append_limited_keeps_the_tail() {
        let mut buffer = Vec::new();
        let mut truncated = false;
        append_limited(&mut buffer, b"abcdef", 4, &mut truncated);
        assert_eq!(buffer, b"cdef");
        assert!(truncated);
        append_limited(&mut buffer, b"gh", 4, &mut truncated);
        assert_eq!(buffer, b"efgh");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_output_and_status_unix() -> anyhow::Result<()> {
        let child = Command::new("/bin/sh")
            .args(["-c", "printf 'out\\r\\n' && printf err >&2; exit 7"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let output = wait_with_output(child, HookOutput::Quiet, 1024).await?;
        assert_eq!(output.code, 7);
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn truncates_large_output_unix() -> anyhow::Result<()> {
        let child = Command::new("/bin/sh")
            .args(["-c", "head -c 4096 /dev/zero | tr '\\000' a"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let output = wait_with_output(child, HookOutput::Capture, 256).await?;
        assert!(output.stdout.contains("[...truncated...]"));
        assert!(output.stdout.len() <= 256 + TRUNCATED_MARKER.len());
        Ok(())
    }
}
