use chrono::{DateTime, Utc};
use rand::Rng;

/// Builds `<PREFIX><YYYYMMDDHHMMSS><4 random digits>`.
pub fn generate_reference(prefix: &str) -> String {
    generate_reference_at(prefix, Utc::now())
}

pub fn generate_reference_at(prefix: &str, timestamp: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(1000..10000);
    format!("{}{}{}", prefix, timestamp.format("%Y%m%d%H%M%S"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_reference_layout() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 17, 9, 5, 3).unwrap();
        let reference = generate_reference_at("BBPS", ts);

        assert!(reference.starts_with("BBPS20261017090503"));
        assert_eq!(reference.len(), "BBPS".len() + 14 + 4);
        assert!(reference[reference.len() - 4..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_references_vary() {
        let refs: std::collections::HashSet<String> =
            (0..50).map(|_| generate_reference("TXN")).collect();
        assert!(refs.len() > 1);
    }
}
