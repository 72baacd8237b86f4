// src/matching/mod.rs
pub mod address;
pub mod geofence;
pub mod name;
pub mod places;
pub mod url;

use crate::models::core::CompanyRecord;

/// Fills the derived identity fields on an incoming record. An aggregator
/// website leaves `domain` empty.
pub fn tag_record(record: &mut CompanyRecord) {
    record.normalized_name = name::normalize_name(&record.name);
    record.domain = record.website.as_deref().and_then(url::identity_domain);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::ValidationSource;

    #[test]
    fn test_tag_record() {
        let mut rec = CompanyRecord::new("Acme Bio, Inc.", ValidationSource::Bpg).with_website("https://www.acme.com/about");
        tag_record(&mut rec);
        assert_eq!(rec.normalized_name, "acme bio");
        assert_eq!(rec.domain.as_deref(), Some("acme.com"));

        let mut listed = CompanyRecord::new("Acme Bio", ValidationSource::Web)
            .with_website("https://www.linkedin.com/company/acme");
        tag_record(&mut listed);
        assert_eq!(listed.domain, None);
    }
}
