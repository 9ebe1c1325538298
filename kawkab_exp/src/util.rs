use std::time::Duration;

#[macro_export]
macro_rules! args {
    ($($element:expr),*) => {{
        #[allow(unused_mut)]
        let mut vs = Vec::new();
        $(vs.push($element.to_string());)*
        vs
    }};
    ($($element:expr,)*) => {{
        $crate::args![$($element),*]
    }};
}

/// Fixed wait between experiment phases.
pub async fn stopwatch(seconds: u64) {
    if seconds == 0 {
        return;
    }
    tracing::info!("waiting {}s", seconds);
    tokio::time::sleep(Duration::from_secs(seconds)).await;
}

/// Joins arguments with spaces, the way they end up on a remote shell.
pub fn join_args(args: Vec<String>) -> String {
    args.join(" ")
}
