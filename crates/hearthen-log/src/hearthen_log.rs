use chrono::Local;
use log::{Level, Log, SetLoggerError};

pub struct HearthenLogger {
    level: Level,
}

impl HearthenLogger {
    /// Installs the logger as the global `log` sink.
    pub fn init(level: Level) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(HearthenLogger { level }))?;
        log::set_max_level(level.to_level_filter());
        Ok(())
    }
}

impl Log for HearthenLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let now = Local::now();
            println!(
                "{} {} {}",
                now.format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}
