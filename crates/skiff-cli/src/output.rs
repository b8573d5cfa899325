use chrono::{DateTime, Utc};
use console::style;

pub fn print_header(text: &str) {
    println!("{} {}", style("===").dim(), style(text).bold());
}

pub fn success(text: &str) {
    println!("{} {}", style("✔").green(), text);
}

pub fn info(text: &str) {
    println!("{} {}", style("ℹ").blue(), text);
}

/// Transient progress note, kept off stdout.
pub fn progress(text: &str) {
    eprintln!("{}", style(text).dim());
}

/// Key/value pairs with the keys padded to a shared width.
pub fn print_aligned(pairs: &[(String, String)]) {
    let width = pairs.iter().map(|(k, _)| k.len()).max().unwrap_or(0) + 1;
    for (key, value) in pairs {
        println!(
            "{} {}",
            style(format!("{:width$}", format!("{key}:"))).green(),
            value
        );
    }
}

/// Compact age for status lines, e.g. "3m ago".
pub fn time_ago(then: DateTime<Utc>) -> String {
    let seconds = (Utc::now() - then).num_seconds().max(0);
    match seconds {
        0..=59 => format!("{seconds}s ago"),
        60..=3599 => format!("{}m ago", seconds / 60),
        3600..=86399 => format!("{}h ago", seconds / 3600),
        _ => format!("{}d ago", seconds / 86400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn time_ago_buckets() {
        let now = Utc::now();
        assert!(time_ago(now).ends_with("s ago"));
        assert_eq!(time_ago(now - Duration::minutes(5)), "5m ago");
        assert_eq!(time_ago(now - Duration::hours(2)), "2h ago");
        assert_eq!(time_ago(now - Duration::days(3)), "3d ago");
        // clock skew never yields negative ages
        assert_eq!(time_ago(now + Duration::minutes(1)), "0s ago");
    }
}
