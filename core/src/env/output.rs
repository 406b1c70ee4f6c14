use std::{
    fmt,
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

/// A shared, writable destination for human readable log lines.
///
/// Cloning a sink produces another handle to the same destination, so a method
/// object constructed from an environment writes to the same place as the
/// environment did at construction time. Two sinks compare equal if they are
/// handles to the same destination.
#[derive(Clone)]
pub struct OutputSink {
    target: Arc<Mutex<Target>>,
}

enum Target {
    Stdout,
    Stderr,
    File(BufWriter<File>),
    Memory(Vec<u8>),
}

impl OutputSink {
    pub fn stdout() -> Self {
        Self::from_target(Target::Stdout)
    }

    pub fn stderr() -> Self {
        Self::from_target(Target::Stderr)
    }

    /// Creates (or truncates) the file at `path` and writes to it.
    pub fn file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::options()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::from_target(Target::File(BufWriter::new(file))))
    }

    /// An in-memory sink. Its contents can be read back with [`OutputSink::contents`].
    pub fn memory() -> Self {
        Self::from_target(Target::Memory(Vec::new()))
    }

    fn from_target(target: Target) -> Self {
        Self {
            target: Arc::new(Mutex::new(target)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Target> {
        // a panic while holding the lock can at most leave a partially written line
        self.target.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Writes a single line, terminated by a newline.
    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut target = self.lock();
        match &mut *target {
            Target::Stdout => writeln!(io::stdout().lock(), "{line}"),
            Target::Stderr => writeln!(io::stderr().lock(), "{line}"),
            Target::File(file) => writeln!(file, "{line}"),
            Target::Memory(buffer) => writeln!(buffer, "{line}"),
        }
    }

    pub fn flush(&self) -> io::Result<()> {
        let mut target = self.lock();
        match &mut *target {
            Target::Stdout => io::stdout().flush(),
            Target::Stderr => io::stderr().flush(),
            Target::File(file) => file.flush(),
            Target::Memory(_) => Ok(()),
        }
    }

    /// Everything written so far, if this is an in-memory sink.
    pub fn contents(&self) -> Option<String> {
        match &*self.lock() {
            Target::Memory(buffer) => Some(String::from_utf8_lossy(buffer).into_owned()),
            _ => None,
        }
    }

    /// Returns true if both handles refer to the same destination.
    pub fn same_as(&self, other: &OutputSink) -> bool {
        Arc::ptr_eq(&self.target, &other.target)
    }
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl PartialEq for OutputSink {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &*self.lock() {
            Target::Stdout => "stdout",
            Target::Stderr => "stderr",
            Target::File(_) => "file",
            Target::Memory(_) => "memory",
        };
        f.debug_tuple("OutputSink").field(&kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::OutputSink;

    #[test]
    fn clones_share_the_destination() {
        let sink = OutputSink::memory();
        let handle = sink.clone();

        handle.write_line("first").unwrap();
        sink.write_line("second").unwrap();

        assert_eq!(sink.contents().as_deref(), Some("first\nsecond\n"));
        assert_eq!(sink, handle);
        assert_ne!(sink, OutputSink::memory());
    }

    #[test]
    fn stdout_has_no_readable_contents() {
        assert_eq!(OutputSink::stdout().contents(), None);
    }
}
