pub(crate) mod args;
pub(crate) mod cli;
pub(crate) mod config;

use chrono::{DateTime, Duration, Local};
use log::LevelFilter;

/// Initialises the logger.
///
/// Every line is tagged with the emitting crate (`decomp`, `optim`, ...).
/// With a launch time, the time elapsed since launch is printed first.
pub fn setup_logging(launch_time: Option<DateTime<Local>>, log_level: u8) {
    use std::io::Write;
    env_logger::builder()
        .format(move |buf, record| {
            let tag = crate_tag(record.module_path());
            match launch_time {
                Some(launch) => writeln!(
                    buf,
                    "{} {:5} [{}]: {}",
                    format_elapsed(Local::now().signed_duration_since(launch)),
                    record.level(),
                    tag,
                    record.args()
                ),
                None => writeln!(buf, "{:5} [{}]: {}", record.level(), tag, record.args()),
            }
        })
        .filter_level(log_filter_from_level(log_level))
        .init();
}

/// Short name of the crate a log record comes from.
fn crate_tag(module_path: Option<&str>) -> &str {
    let krate = module_path
        .and_then(|path| path.split("::").next())
        .unwrap_or("?");
    krate.strip_prefix("specfit_").unwrap_or(krate)
}

/// Formats an elapsed time as `h:mm:ss.mmm`.
fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.num_milliseconds().max(0);
    format!(
        "{}:{:02}:{:02}.{:03}",
        millis / 3_600_000,
        millis / 60_000 % 60,
        millis / 1000 % 60,
        millis % 1000
    )
}

/// Converts a numeric log level to a log filter.
pub fn log_filter_from_level(level: u8) -> LevelFilter {
    match level {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
