/// Format a Unix timestamp as a YYYY-MM-DD string
pub fn format_timestamp(timestamp: i64) -> String {
    use time::OffsetDateTime;
    use time::macros::format_description;

    if timestamp == 0 {
        return "unknown".to_string();
    }

    OffsetDateTime::from_unix_timestamp(timestamp)
        .ok()
        .and_then(|dt| {
            let format = format_description!("[year]-[month]-[day]");
            dt.format(&format).ok()
        })
        .unwrap_or_else(|| "unknown".to_string())
}
