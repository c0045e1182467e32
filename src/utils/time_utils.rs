use chrono::{DateTime, Local, TimeZone};
use std::time::Duration;

/// 日志文件名中的时间格式
pub const LOG_FILE_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// 将作业开始时间格式化为日志文件名片段
#[inline]
pub fn format_log_file_time<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    dt.format(LOG_FILE_TIME_FORMAT).to_string()
}

/// 当前本地时间
#[inline]
pub fn now_local() -> DateTime<Local> {
    Local::now()
}

/// 日志行的相对时间戳，形如 `002.531`
#[inline]
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:07.3}", elapsed.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed_pads_to_three_decimals() {
        assert_eq!(format_elapsed(Duration::from_millis(0)), "000.000");
        assert_eq!(format_elapsed(Duration::from_millis(2531)), "002.531");
        assert_eq!(format_elapsed(Duration::from_secs(1234)), "1234.000");
    }

    #[test]
    fn test_format_log_file_time() {
        let dt = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format_log_file_time(&dt), "2024-03-09_07-05-01");
    }
}
