use crate::TestId;

const TEMPLATE: &str =
    "[{elapsed_precise}] {wide_bar:.green} {pos:>2}/{len:2} (ETA {eta}) {msg}";

/// Progress over the tests of a batch. Once installed, all tracing output
/// goes through it, so log lines are printed above the bar instead of
/// breaking it.
#[derive(Clone)]
pub struct TracingProgressBar {
    progress: indicatif::ProgressBar,
}

impl TracingProgressBar {
    /// Creates the bar for `tests` tests and installs it as the writer of
    /// the global tracing subscriber.
    pub fn init(tests: usize) -> Self {
        let progress = Self::new(indicatif::ProgressBar::new(tests as u64));
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(progress.clone())
            .init();
        progress
    }

    fn new(progress: indicatif::ProgressBar) -> Self {
        progress.set_style(
            indicatif::ProgressStyle::default_bar().template(TEMPLATE),
        );
        Self { progress }
    }

    pub fn start_test(&self, test_id: &TestId, run: usize) {
        self.progress
            .set_message(format!("{} run_{}", test_id, run));
    }

    pub fn test_done(&self) {
        self.progress.inc(1);
    }

    pub fn finish(&self) {
        self.progress.finish_with_message("batch done");
    }
}

impl std::io::Write for TracingProgressBar {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let line = String::from_utf8_lossy(buf);
        self.progress.println(line.trim_end());
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for TracingProgressBar {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
