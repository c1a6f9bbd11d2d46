//! Nice CSM² output formatting.

use std::fmt;

use log;

const CSM2_BANNER_LENGTH: usize = 103;

/// Logs an error to the `csm2-output` logger.
macro_rules! csm2_error {
    ($fmt:expr $(, $($arg:tt)*)?) => {
        log::error!($fmt, $($($arg)*)?);
        log::error!(target: "csm2-output", $fmt, $($($arg)*)?);
    }
}

/// Logs a warning to the `csm2-output` logger.
macro_rules! csm2_warn {
    ($fmt:expr $(, $($arg:tt)*)?) => {
        log::warn!($fmt, $($($arg)*)?);
        log::warn!(target: "csm2-output", $fmt, $($($arg)*)?);
    }
}

/// Logs a main output line to the `csm2-output` logger.
macro_rules! csm2_output {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::info!(target: "csm2-output", $fmt, $($($arg)*)?); }
}

pub(crate) use {csm2_error, csm2_output, csm2_warn};

/// Logs a nicely formatted section title to the `csm2-output` logger.
pub(crate) fn log_title(title: &str) {
    let length = title.chars().count().max(CSM2_BANNER_LENGTH - 6);
    let bar = "─".repeat(length);
    csm2_output!("┌──{bar}──┐");
    csm2_output!("│§ {title:^length$} §│");
    csm2_output!("└──{bar}──┘");
}

/// Writes a nicely formatted subtitle.
pub(crate) fn write_subtitle(f: &mut fmt::Formatter<'_>, subtitle: &str) -> fmt::Result {
    let length = subtitle.chars().count();
    let bar = "═".repeat(length);
    writeln!(f, "{subtitle}")?;
    writeln!(f, "{bar}")?;
    Ok(())
}

/// Logs a nicely formatted subtitle to the `csm2-output` logger.
pub(crate) fn log_subtitle(subtitle: &str) {
    let length = subtitle.chars().count();
    let bar = "═".repeat(length);
    csm2_output!("{}", subtitle);
    csm2_output!("{}", bar);
}

/// Logs a nicely formatted micro-section beginning to the `csm2-output` logger.
pub(crate) fn log_micsec_begin(sectitle: &str) {
    let width = CSM2_BANNER_LENGTH - 14;
    let sectitle_space = sectitle.to_string() + " ";
    csm2_output!("‹‹‹‹‹ [Begin] {sectitle_space:‹<width$}");
}

/// Logs a nicely formatted micro-section ending to the `csm2-output` logger.
pub(crate) fn log_micsec_end(sectitle: &str) {
    let width = CSM2_BANNER_LENGTH - 14;
    let sectitle_space = sectitle.to_string() + " ";
    csm2_output!("››››› [ End ] {sectitle_space:›<width$}");
}

/// Turns a boolean into a string of `yes` or `no`.
pub(crate) fn nice_bool(b: bool) -> String {
    if b {
        "yes".to_string()
    } else {
        "no".to_string()
    }
}

/// A trait for logging `CSM2` outputs nicely.
pub(crate) trait Csm2Output: fmt::Debug + fmt::Display {
    /// Logs display output nicely.
    fn log_output_display(&self) {
        let lines = self.to_string();
        lines.lines().for_each(|line| {
            csm2_output!("{line}");
        })
    }
}

// Blanket implementation
impl<T> Csm2Output for T where T: fmt::Debug + fmt::Display {}
