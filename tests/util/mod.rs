#![allow(dead_code)]

use std::path::{Path, PathBuf};

use fds_query::timeslots::BucketClock;

/// Captures tracing output for assertions.
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// 2024-03-10 12:00:00 UTC, on the 5-minute grid.
pub const T0: i64 = 1_710_072_000;

/// Create an empty bucket file for `source` at `ts` and return its path
/// relative to the source directory.
pub fn touch_bucket(root: &Path, source: &str, ts: i64) -> String {
    let rel = BucketClock::Utc.bucket_path(ts).expect("bucket path");
    let path = root.join(source).join(&rel);
    std::fs::create_dir_all(path.parent().unwrap()).expect("create bucket dir");
    std::fs::write(&path, b"").expect("write bucket");
    rel
}

/// Write an executable shell script standing in for fdsdump. Every
/// invocation records its arguments, one per line, in `args.txt` next to it.
#[cfg(unix)]
pub fn fake_fdsdump(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fdsdump");
    let args_file = dir.join("args.txt");
    let script = format!(
        "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{}'\n{body}\n",
        args_file.display()
    );
    std::fs::write(&path, script).expect("write fake fdsdump");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake fdsdump");
    path
}

/// Arguments seen by the last fake fdsdump run in `dir`.
pub fn recorded_args(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("args.txt"))
        .expect("fake fdsdump did not run")
        .lines()
        .map(str::to_string)
        .collect()
}
