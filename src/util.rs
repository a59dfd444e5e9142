use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::path::Path;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

/// Longest log line emitted before truncation, in characters.
pub const MAX_LOG_CHARS: usize = 8000;

static DATA_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"data:[^;\s]*;base64,([A-Za-z0-9+/=]*)").expect("valid data uri regex")
});

static BASE64_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9+/=]{256,}").expect("valid base64 regex"));

/// Load environment files before configuration is parsed.
/// - Explicit paths via ENV_FILE, ENVFILE, DOTENV_PATH
/// - Then `.envfile`, then the standard `.env` discovery
/// - Finally a `.env` found walking up from the executable directory
///
/// Returns a description of the source used, or `"none"`.
pub fn load_env_files() -> String {
    for key in ["ENV_FILE", "ENVFILE", "DOTENV_PATH"] {
        if let Ok(p) = std::env::var(key) {
            let p = p.trim();
            if !p.is_empty() && Path::new(p).is_file() && dotenvy::from_filename(p).is_ok() {
                return format!("{p} ({key})");
            }
        }
    }

    if Path::new(".envfile").is_file() && dotenvy::from_filename(".envfile").is_ok() {
        return ".envfile".into();
    }

    if dotenvy::dotenv().is_ok() {
        return ".env".into();
    }

    if let Ok(exe) = std::env::current_exe() {
        let mut dir_opt = exe.parent();
        while let Some(dir) = dir_opt {
            let candidate = dir.join(".env");
            if candidate.is_file() && dotenvy::from_filename(&candidate).is_ok() {
                return candidate.display().to_string();
            }
            dir_opt = dir.parent();
        }
    }

    "none".into()
}

/// Initialize structured tracing. `RUST_LOG` wins; otherwise `info`, or `debug` when
/// `debug` is set. Output goes through [`SanitizingMakeWriter`].
pub fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_writer(SanitizingMakeWriter::new(io::stdout))
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Elide base64 payloads and cap the length of a log line.
///
/// `data:<mime>;base64,<payload>` keeps its prefix with the payload replaced by its length;
/// any other base64-looking run of 256+ characters is replaced entirely.
pub fn sanitize_log_text(input: &str) -> String {
    let s = DATA_URI.replace_all(input, |caps: &regex::Captures<'_>| {
        let len = caps.get(1).map_or(0, |m| m.as_str().len());
        format!("data:...;base64,[OMITTED,len={len}]")
    });
    let s = BASE64_RUN.replace_all(&s, |caps: &regex::Captures<'_>| {
        format!("[[OMITTED_BASE64 len={}]]", caps[0].len())
    });

    let total = s.chars().count();
    if total > MAX_LOG_CHARS {
        let cut = s
            .char_indices()
            .nth(MAX_LOG_CHARS)
            .map_or(s.len(), |(idx, _)| idx);
        return format!("{}...[[TRUNCATED len={}]]", &s[..cut], total);
    }
    s.into_owned()
}

/// `MakeWriter` wrapper that runs every formatted event through [`sanitize_log_text`].
#[derive(Debug, Clone)]
pub struct SanitizingMakeWriter<M> {
    inner: M,
}

impl<M> SanitizingMakeWriter<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<'a, M> MakeWriter<'a> for SanitizingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter {
            inner: self.inner.make_writer(),
        }
    }
}

#[derive(Debug)]
pub struct SanitizingWriter<W> {
    inner: W,
}

impl<W: io::Write> io::Write for SanitizingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let (line, newline) = match text.strip_suffix('\n') {
            Some(line) => (line, "\n"),
            None => (text.as_ref(), ""),
        };
        let cleaned = sanitize_log_text(line);
        self.inner.write_all(cleaned.as_bytes())?;
        self.inner.write_all(newline.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;
        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn data_uri_payload_is_omitted() {
        let out = sanitize_log_text(r#"{"url":"data:image/png;base64,iVBORw0KGgo="}"#);
        assert_eq!(out, r#"{"url":"data:...;base64,[OMITTED,len=12]"}"#);
    }

    #[test]
    fn long_base64_runs_are_omitted() {
        let blob = "A".repeat(300);
        let out = sanitize_log_text(&format!("file: {blob} end"));
        assert_eq!(out, "file: [[OMITTED_BASE64 len=300]] end");

        let short = "QUJD".repeat(10);
        assert_eq!(sanitize_log_text(&short), short);
    }

    #[test]
    fn long_lines_are_truncated() {
        let line = "word ".repeat(2000);
        let out = sanitize_log_text(&line);
        assert!(out.ends_with("...[[TRUNCATED len=10000]]"));
        assert!(out.starts_with("word word"));
        assert_eq!(
            out.chars().count(),
            MAX_LOG_CHARS + "...[[TRUNCATED len=10000]]".len()
        );
    }

    #[test]
    fn writer_sanitizes_events() {
        let buffer = Buffer::default();
        let subscriber = fmt()
            .with_ansi(false)
            .with_writer(SanitizingMakeWriter::new(buffer.clone()))
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("upload data:image/jpeg;base64,{}", "/9j/".repeat(100));
        });
        let logged = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("upload data:...;base64,[OMITTED,len=400]"));
        assert!(logged.ends_with('\n'));
    }
}
