//! A pair of one-directional pipes whose child ends are inherited by exactly
//! one spawned hook process.
//!
//! The parent keeps the writer of the request pipe and the reader of the
//! response pipe. The child ends are handed over by number on the command
//! line: plain descriptors on Unix, raw `HANDLE` values on Windows. Every
//! end is owned by this struct until taken or dropped, so all four are
//! closed exactly once on every exit path.

use std::io::{self, PipeReader, PipeWriter};

use tokio::process::{Child, Command};

#[derive(Debug)]
pub struct DuplexChannel {
    parent_writer: Option<PipeWriter>,
    parent_reader: Option<PipeReader>,
    child_reader: Option<PipeReader>,
    child_writer: Option<PipeWriter>,
}

impl DuplexChannel {
    pub fn open() -> io::Result<Self> {
        let (child_reader, parent_writer) = io::pipe()?;
        let (parent_reader, child_writer) = io::pipe()?;
        Ok(Self {
            parent_writer: Some(parent_writer),
            parent_reader: Some(parent_reader),
            child_reader: Some(child_reader),
            child_writer: Some(child_writer),
        })
    }

    /// Textual identifiers of the child's `(read, write)` ends, or `None`
    /// once the child ends were released by [`DuplexChannel::spawn`].
    #[must_use]
    pub fn child_handles(&self) -> Option<(String, String)> {
        let reader = self.child_reader.as_ref()?;
        let writer = self.child_writer.as_ref()?;
        Some((platform::raw_id(reader), platform::raw_id(writer)))
    }

    /// Parent end feeding the child's input.
    pub fn take_writer(&mut self) -> io::Result<PipeWriter> {
        self.parent_writer
            .take()
            .ok_or_else(|| io::Error::other("duplex channel writer already taken"))
    }

    /// Parent end receiving the child's output.
    pub fn take_reader(&mut self) -> io::Result<PipeReader> {
        self.parent_reader
            .take()
            .ok_or_else(|| io::Error::other("duplex channel reader already taken"))
    }

    /// Spawn `command` with the child ends inherited, then close the
    /// parent's copies of them.
    pub fn spawn(&mut self, command: &mut Command) -> io::Result<Child> {
        let (Some(reader), Some(writer)) = (self.child_reader.take(), self.child_writer.take())
        else {
            return Err(io::Error::other("duplex channel already spawned a child"));
        };
        platform::spawn_inheriting(command, &reader, &writer)
    }
}

#[cfg(unix)]
mod platform {
    use std::io::{self, PipeReader, PipeWriter};
    use std::os::fd::{AsRawFd, RawFd};

    use tokio::process::{Child, Command};

    pub(super) fn raw_id(end: &impl AsRawFd) -> String {
        end.as_raw_fd().to_string()
    }

    pub(super) fn spawn_inheriting(
        command: &mut Command,
        reader: &PipeReader,
        writer: &PipeWriter,
    ) -> io::Result<Child> {
        let fds = [reader.as_raw_fd(), writer.as_raw_fd()];
        // SAFETY: only fcntl runs between fork and exec, which is
        // async-signal-safe, and the descriptors stay open in the parent
        // until spawn returns.
        unsafe {
            command.pre_exec(move || fds.iter().try_for_each(|fd| clear_cloexec(*fd)));
        }
        command.spawn()
    }

    fn clear_cloexec(fd: RawFd) -> io::Result<()> {
        // SAFETY: plain descriptor flag manipulation on a valid descriptor.
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: as above.
        if unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(windows)]
mod platform {
    use std::io::{self, PipeReader, PipeWriter};
    use std::os::windows::io::{AsRawHandle, RawHandle};
    use std::sync::{Mutex, PoisonError};

    use tokio::process::{Child, Command};
    use windows_sys::Win32::Foundation::{SetHandleInformation, HANDLE_FLAG_INHERIT};

    // Other children spawned while the flag is set would inherit the ends too.
    static SPAWN_LOCK: Mutex<()> = Mutex::new(());

    pub(super) fn raw_id(end: &impl AsRawHandle) -> String {
        (end.as_raw_handle() as usize).to_string()
    }

    pub(super) fn spawn_inheriting(
        command: &mut Command,
        reader: &PipeReader,
        writer: &PipeWriter,
    ) -> io::Result<Child> {
        let _guard = SPAWN_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let handles = [reader.as_raw_handle(), writer.as_raw_handle()];
        for handle in handles {
            set_inheritable(handle, true)?;
        }
        let spawned = command.spawn();
        for handle in handles {
            let _ = set_inheritable(handle, false);
        }
        spawned
    }

    fn set_inheritable(handle: RawHandle, inherit: bool) -> io::Result<()> {
        let flags = if inherit { HANDLE_FLAG_INHERIT } else { 0 };
        // SAFETY: the handle belongs to a live pipe end borrowed by the caller.
        if unsafe { SetHandleInformation(handle, HANDLE_FLAG_INHERIT, flags) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::process::Stdio;

    use super::*;

    #[test]
    fn ends_can_only_be_taken_once() -> anyhow::Result<()> {
        let mut channel = DuplexChannel::open()?;
        assert!(channel.child_handles().is_some());
        let _writer = channel.take_writer()?;
        assert!(channel.take_writer().is_err());
        let _reader = channel.take_reader()?;
        assert!(channel.take_reader().is_err());
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn child_echoes_through_inherited_ends() -> anyhow::Result<()> {
        let mut channel = DuplexChannel::open()?;
        let (child_in, child_out) = channel
            .child_handles()
            .ok_or_else(|| anyhow::anyhow!("child ends missing"))?;
        let mut writer = channel.take_writer()?;
        writer.write_all(b"ping")?;
        drop(writer);

        let mut command = Command::new("/bin/sh");
        command
            .arg("-c")
            .arg(format!("cat /dev/fd/{child_in} > /dev/fd/{child_out}"))
            .stdin(Stdio::null());
        let mut child = channel.spawn(&mut command)?;
        assert!(channel.child_handles().is_none());

        let mut reader = channel.take_reader()?;
        let status = child.wait().await?;
        assert!(status.success());
        let echoed = tokio::task::spawn_blocking(move || {
            let mut text = String::new();
            reader.read_to_string(&mut text).map(|_| text)
        })
        .await??;
        assert_eq!(echoed, "ping");
        Ok(())
    }
}
