use std::io::Write;
use std::path::Path;

use anyhow::Result;
use tracing::{debug, debug_span, warn};

use crate::classify::{CharsetSniffer, Classification, classify};
use crate::encoding::{CANDIDATES, Trial, run_trials};
use crate::files::{FileTask, collect_files};
use crate::logging::ChangeLog;
use crate::rewrite::replace_contents;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionOutcome {
    SkippedEmpty,
    SkippedTooLarge,
    SkippedAlreadyUtf8,
    Converted(&'static str),
    Failed,
}

impl ConversionOutcome {
    pub fn tag(&self) -> &'static str {
        match self {
            ConversionOutcome::SkippedEmpty => "[SKIPPED - EMPTY]",
            ConversionOutcome::SkippedTooLarge => "[SKIPPED - TOO LARGE]",
            ConversionOutcome::SkippedAlreadyUtf8 => "[SKIPPED - ALREADY UTF-8]",
            ConversionOutcome::Converted(_) => "[OK]",
            ConversionOutcome::Failed => "[FAILED]",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConversionOutcome::SkippedEmpty => "skipped-empty",
            ConversionOutcome::SkippedTooLarge => "skipped-too-large",
            ConversionOutcome::SkippedAlreadyUtf8 => "skipped-already-utf8",
            ConversionOutcome::Converted(_) => "converted",
            ConversionOutcome::Failed => "failed",
        }
    }

    pub fn encoding(&self) -> Option<&'static str> {
        match self {
            ConversionOutcome::Converted(label) => Some(*label),
            _ => None,
        }
    }
}

impl From<Trial> for ConversionOutcome {
    fn from(trial: Trial) -> Self {
        match trial {
            Trial::Accepted(candidate) => ConversionOutcome::Converted(candidate.label),
            Trial::Exhausted => ConversionOutcome::Failed,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    fn count(&mut self, outcome: &ConversionOutcome) {
        match outcome {
            ConversionOutcome::Converted(_) => self.converted += 1,
            ConversionOutcome::Failed => self.failed += 1,
            _ => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed(RunSummary),
    Interrupted(RunSummary),
}

pub fn convert_file(path: &Path, sniffer: &dyn CharsetSniffer) -> ConversionOutcome {
    let _span = debug_span!("file", path = %path.display()).entered();
    match try_convert(path, sniffer) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!("{}: {err:#}", path.display());
            ConversionOutcome::Failed
        }
    }
}

fn try_convert(path: &Path, sniffer: &dyn CharsetSniffer) -> Result<ConversionOutcome> {
    let task = FileTask::load(path.to_path_buf())?;
    let bytes = match classify(&task, sniffer)? {
        Classification::Skip(outcome) => return Ok(outcome),
        Classification::Convert(bytes) => bytes,
    };

    let trial = run_trials(bytes, CANDIDATES, |data| {
        replace_contents(&task.path, data, &task.permissions)
    });
    Ok(trial.into())
}

pub fn run_conversion<W, S>(
    root: &Path,
    sniffer: &dyn CharsetSniffer,
    change_log: Option<&ChangeLog>,
    should_stop: S,
    out: &mut W,
) -> Result<RunStatus>
where
    W: Write,
    S: Fn() -> bool,
{
    let files = collect_files(root);
    debug!("found {} files under {}", files.len(), root.display());

    let mut summary = RunSummary::default();
    for path in &files {
        if should_stop() {
            warn!("interrupted before {}", path.display());
            return Ok(RunStatus::Interrupted(summary));
        }

        write!(out, "Converting {} ", path.display())?;
        out.flush()?;
        let outcome = convert_file(path, sniffer);
        writeln!(out, "{}", outcome.tag())?;

        summary.count(&outcome);
        if let Some(log) = change_log {
            if let Err(err) = log.record(path, &outcome) {
                warn!("change log: {err:#}");
            }
        }
    }

    debug!(
        converted = summary.converted,
        skipped = summary.skipped,
        failed = summary.failed,
        "run finished"
    );
    Ok(RunStatus::Completed(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ContentSniffer, MAX_FILE_SIZE};
    use encoding_rs::{Encoding, UTF_8};
    use std::cell::Cell;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().expect("temp dir");
            let root = dir.path().join("input");
            fs::create_dir_all(root.join("nested")).expect("input dir");
            Self { _dir: dir, root }
        }

        fn write(&self, name: &str, data: &[u8]) -> PathBuf {
            let path = self.root.join(name);
            fs::write(&path, data).expect("write fixture");
            path
        }
    }

    fn run(root: &Path) -> (RunStatus, String) {
        let mut out = Vec::new();
        let status =
            run_conversion(root, &ContentSniffer, None, || false, &mut out).expect("run");
        (status, String::from_utf8(out).expect("utf-8 output"))
    }

    fn line_for(output: &str, path: &Path) -> String {
        let prefix = format!("Converting {} ", path.display());
        output
            .lines()
            .find(|line| line.starts_with(&prefix))
            .unwrap_or_else(|| panic!("no status line for {}", path.display()))
            .to_string()
    }

    fn utf16le(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn reports_every_outcome() {
        let fx = Fixture::new();
        let empty = fx.write("empty.txt", b"");
        let large = fx.root.join("large.log");
        fs::File::create(&large)
            .expect("create")
            .set_len(MAX_FILE_SIZE + 1)
            .expect("set_len");
        let utf8 = fx.write("utf8.txt", "already fine ✓\n".as_bytes());
        let bom = fx.write("nested/bom.txt", b"\xEF\xBB\xBFwith bom\n");
        let cp1252 = fx.write("cp1252.txt", b"It\x92s a \x93test\x94\x85\n");
        let garbage_bytes = [0xFF, 0x00, 0x01, 0x02, 0x03];
        let garbage = fx.write("garbage.bin", &garbage_bytes);

        let (status, output) = run(&fx.root);

        assert_eq!(
            status,
            RunStatus::Completed(RunSummary {
                converted: 2,
                skipped: 3,
                failed: 1,
            })
        );
        assert_eq!(output.lines().count(), 6);
        assert!(line_for(&output, &empty).ends_with("[SKIPPED - EMPTY]"));
        assert!(line_for(&output, &large).ends_with("[SKIPPED - TOO LARGE]"));
        assert!(line_for(&output, &utf8).ends_with("[SKIPPED - ALREADY UTF-8]"));
        assert!(line_for(&output, &bom).ends_with("[OK]"));
        assert!(line_for(&output, &cp1252).ends_with("[OK]"));
        assert!(line_for(&output, &garbage).ends_with("[FAILED]"));

        assert_eq!(fs::read(&empty).expect("read"), b"");
        assert_eq!(fs::metadata(&large).expect("meta").len(), MAX_FILE_SIZE + 1);
        assert_eq!(fs::read(&utf8).expect("read"), "already fine ✓\n".as_bytes());
        assert_eq!(fs::read(&bom).expect("read"), b"with bom\n");
        assert_eq!(
            fs::read_to_string(&cp1252).expect("utf-8 after conversion"),
            "It\u{2019}s a \u{201C}test\u{201D}\u{2026}\n"
        );
        assert_eq!(fs::read(&garbage).expect("read"), garbage_bytes);
    }

    #[test]
    fn utf16le_file_converts_via_utf16le() {
        let fx = Fixture::new();
        let text = "Съешь же ещё этих мягких булок\n";
        let path = fx.write("ru.txt", &utf16le(text));

        assert_eq!(
            convert_file(&path, &ContentSniffer),
            ConversionOutcome::Converted("UTF-16LE")
        );
        assert_eq!(fs::read_to_string(&path).expect("read"), text);
    }

    #[test]
    fn cyrillic_utf16le_without_spacing_is_converted() {
        let fx = Fixture::new();
        let path = fx.write("word.txt", &utf16le("Привет"));

        let (status, output) = run(&fx.root);
        assert_eq!(
            status,
            RunStatus::Completed(RunSummary {
                converted: 1,
                skipped: 0,
                failed: 0,
            })
        );
        assert!(line_for(&output, &path).ends_with("[OK]"));
        assert_eq!(fs::read_to_string(&path).expect("read"), "Привет");
    }

    #[test]
    fn bom_only_file_becomes_empty() {
        let fx = Fixture::new();
        let path = fx.write("bom_only.txt", b"\xEF\xBB\xBF");

        assert_eq!(
            convert_file(&path, &ContentSniffer),
            ConversionOutcome::Converted("UTF-8")
        );
        assert_eq!(fs::read(&path).expect("read"), b"");
        assert_eq!(
            convert_file(&path, &ContentSniffer),
            ConversionOutcome::SkippedEmpty
        );
    }

    #[test]
    fn leftover_scratch_file_is_not_processed() {
        let fx = Fixture::new();
        let scratch = fx.write(".utf8ify-k3Xq9Z", b"caf\xE9\n");

        let (status, output) = run(&fx.root);
        assert_eq!(status, RunStatus::Completed(RunSummary::default()));
        assert!(!output.contains(".utf8ify-"));
        assert_eq!(fs::read(&scratch).expect("read"), b"caf\xE9\n");
    }

    #[test]
    fn second_run_is_a_fixed_point() {
        let fx = Fixture::new();
        let files = [
            fx.write("bom.txt", b"\xEF\xBB\xBFhello\n"),
            fx.write("legacy.txt", b"na\xEFve caf\xE9 \x93quoted\x94\n"),
            fx.write("nested/wide.txt", &utf16le("wide text\r\n")),
            fx.write("plain.txt", b"plain ascii\n"),
        ];

        let (first, _) = run(&fx.root);
        assert_eq!(
            first,
            RunStatus::Completed(RunSummary {
                converted: 3,
                skipped: 1,
                failed: 0,
            })
        );
        let snapshot: Vec<_> = files
            .iter()
            .map(|path| fs::read(path).expect("read"))
            .collect();

        let (second, output) = run(&fx.root);
        assert_eq!(
            second,
            RunStatus::Completed(RunSummary {
                converted: 0,
                skipped: 4,
                failed: 0,
            })
        );
        for (path, before) in files.iter().zip(snapshot) {
            assert!(line_for(&output, path).ends_with("[SKIPPED - ALREADY UTF-8]"));
            assert_eq!(fs::read(path).expect("read"), before);
        }
    }

    #[cfg(unix)]
    #[test]
    fn conversion_keeps_permission_bits() {
        use std::os::unix::fs::PermissionsExt;

        let fx = Fixture::new();
        let path = fx.write("legacy.txt", b"caf\xE9 cr\xE8me\n");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).expect("chmod");

        assert!(matches!(
            convert_file(&path, &ContentSniffer),
            ConversionOutcome::Converted(_)
        ));
        let mode = fs::metadata(&path).expect("meta").permissions().mode();
        assert_eq!(mode & 0o7777, 0o640);
    }

    #[test]
    fn sniffer_is_pluggable() {
        struct AlwaysUtf8;
        impl CharsetSniffer for AlwaysUtf8 {
            fn sniff(&self, _bytes: &[u8]) -> Option<&'static Encoding> {
                Some(UTF_8)
            }
        }

        let fx = Fixture::new();
        let path = fx.write("legacy.txt", b"caf\xE9\n");
        assert_eq!(
            convert_file(&path, &AlwaysUtf8),
            ConversionOutcome::SkippedAlreadyUtf8
        );
        assert_eq!(fs::read(&path).expect("read"), b"caf\xE9\n");
    }

    #[test]
    fn stop_request_halts_between_files() {
        let fx = Fixture::new();
        let first = fx.write("a.txt", b"caf\xE9\n");
        let second = fx.write("b.txt", b"caf\xE9\n");
        let polls = Cell::new(0);
        let mut out = Vec::new();

        let status = run_conversion(
            &fx.root,
            &ContentSniffer,
            None,
            || {
                polls.set(polls.get() + 1);
                polls.get() > 1
            },
            &mut out,
        )
        .expect("run");

        assert!(matches!(
            status,
            RunStatus::Interrupted(RunSummary { converted: 1, .. })
        ));
        let output = String::from_utf8(out).expect("utf-8 output");
        assert_eq!(output.lines().count(), 1);
        assert!(line_for(&output, &first).ends_with("[OK]"));
        assert_eq!(fs::read(&second).expect("read"), b"caf\xE9\n");
    }

    #[test]
    fn outcomes_feed_the_change_log() {
        let fx = Fixture::new();
        fx.write("legacy.txt", b"caf\xE9\n");
        let log_path = fx._dir.path().join("changes.jsonl");
        let log = ChangeLog::new(log_path.clone());
        let mut out = Vec::new();

        run_conversion(&fx.root, &ContentSniffer, Some(&log), || false, &mut out).expect("run");

        let contents = fs::read_to_string(&log_path).expect("log");
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("\"outcome\":\"converted\""));
    }

    #[test]
    fn missing_file_is_reported_as_failed() {
        let fx = Fixture::new();
        let outcome = convert_file(&fx.root.join("gone.txt"), &ContentSniffer);
        assert_eq!(outcome, ConversionOutcome::Failed);
    }
}
