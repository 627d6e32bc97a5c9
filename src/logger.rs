//! Structured logging setup.
//!
//! Mirrors the three-logger split used throughout this crate's lineage: an
//! application log, an audit log (every mutating Disk/Transaction
//! operation), and a metrics log (periodic WAL/signal/group statistics).
//! All three are `log4rs`-backed rolling file appenders rooted at
//! `{base}/{stem}_logs/`.

use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

const ROLL_BYTES: u64 = 10 * 1024 * 1024;
const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";

/// Initialize logging rooted at `{base_dir}/{stem}_logs/`, with a
/// `{stem}.log` app log, `{stem}_audit.log` audit log (target `fxd::audit`)
/// and `{stem}_metrics.log` metrics log (target `fxd::metrics`).
///
/// # Errors
/// Returns an error if the log directory cannot be created or the
/// `log4rs` configuration fails to build.
pub fn init_for_path(
    base_dir: &Path,
    stem: &str,
    level: LevelFilter,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut dir = PathBuf::from(base_dir);
    dir.push(format!("{stem}_logs"));
    std::fs::create_dir_all(&dir)?;

    let app_log = dir.join(format!("{stem}.log"));
    let app_roller =
        FixedWindowRoller::builder().build(&format!("{}", dir.join(format!("{stem}.{{}}.log")).display()), 7)?;
    let app_policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_BYTES)), Box::new(app_roller));
    let app_appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(app_log, Box::new(app_policy))?;

    let audit_log = dir.join(format!("{stem}_audit.log"));
    let audit_roller = FixedWindowRoller::builder()
        .build(&format!("{}", dir.join(format!("{stem}.audit.{{}}.log")).display()), 7)?;
    let audit_policy =
        CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_BYTES)), Box::new(audit_roller));
    let audit_appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(audit_log, Box::new(audit_policy))?;

    let metrics_log = dir.join(format!("{stem}_metrics.log"));
    let metrics_roller = FixedWindowRoller::builder()
        .build(&format!("{}", dir.join(format!("{stem}.metrics.{{}}.log")).display()), 7)?;
    let metrics_policy =
        CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_BYTES)), Box::new(metrics_roller));
    let metrics_appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(metrics_log, Box::new(metrics_policy))?;

    let config = Config::builder()
        .appender(Appender::builder().build("app", Box::new(app_appender)))
        .appender(Appender::builder().build("audit", Box::new(audit_appender)))
        .appender(Appender::builder().build("metrics", Box::new(metrics_appender)))
        .logger(Logger::builder().appender("audit").additive(false).build("fxd::audit", level))
        .logger(Logger::builder().appender("metrics").additive(false).build("fxd::metrics", level))
        .build(Root::builder().appender("app").build(level))?;

    log4rs::init_config(config)?;
    Ok(())
}

/// Record a mutating operation to the `fxd::audit` target.
pub fn audit(op: &str, detail: &str) {
    log::info!(target: "fxd::audit", "{op} {detail}");
}

/// Record a periodic statistic to the `fxd::metrics` target.
pub fn metrics(line: &str) {
    log::info!(target: "fxd::metrics", "{line}");
}
