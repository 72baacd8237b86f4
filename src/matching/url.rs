// src/matching/url.rs - Registrable-domain extraction and aggregator detection
use url::Url as StdUrl;

use crate::models::matching::DomainComparison;

/// Multi-label public suffixes that need three labels for the registrable
/// domain. Single-label TLDs (".com", ".io", ".bio") need two.
const COMPOUND_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "ltd.uk", "plc.uk", "me.uk", "com.au", "net.au", "org.au",
    "edu.au", "co.nz", "org.nz", "co.jp", "ne.jp", "or.jp", "co.kr", "or.kr", "com.br", "com.mx",
    "com.cn", "net.cn", "com.sg", "com.hk", "co.in", "co.il", "co.za", "com.tw", "com.ar", "co.at",
];

/// Listing, social and site-builder platforms that host many unrelated
/// companies. Never usable as a company's identity.
const AGGREGATOR_DOMAINS: &[&str] = &[
    // social
    "linkedin.com",
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "youtube.com",
    "youtu.be",
    "medium.com",
    // directories and databases
    "crunchbase.com",
    "biopharmguy.com",
    "wikipedia.org",
    "wikimedia.org",
    "zoominfo.com",
    "pitchbook.com",
    "cbinsights.com",
    "tracxn.com",
    "owler.com",
    "craft.co",
    "dnb.com",
    "bloomberg.com",
    "glassdoor.com",
    "indeed.com",
    "yelp.com",
    "yellowpages.com",
    "mapquest.com",
    "angel.co",
    "wellfound.com",
    "bizjournals.com",
    "businesswire.com",
    "prnewswire.com",
    "globenewswire.com",
    "fiercebiotech.com",
    "sec.gov",
    "clinicaltrials.gov",
    // site builders and shorteners
    "google.com",
    "goo.gl",
    "bit.ly",
    "wixsite.com",
    "wix.com",
    "squarespace.com",
    "wordpress.com",
    "blogspot.com",
    "weebly.com",
    "godaddysites.com",
    "webflow.io",
    "github.io",
    "carrd.co",
];

/// Parses `url_s` (scheme optional) and returns its registrable domain
/// (eTLD+1) without `www.`. Fails closed to `None` on anything unparseable,
/// IP hosts, and bare public suffixes.
pub fn registrable_domain(url_s: &str) -> Option<String> {
    let host = normalized_host(url_s)?;
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return None;
    }

    let last_two = format!("{}.{}", labels[labels.len() - 2], labels[labels.len() - 1]);
    if COMPOUND_SUFFIXES.contains(&last_two.as_str()) {
        if labels.len() < 3 {
            return None;
        }
        Some(format!("{}.{}", labels[labels.len() - 3], last_two))
    } else {
        Some(last_two)
    }
}

/// Host of `url_s`, lower-cased, `www.` and trailing dot removed.
fn normalized_host(url_s: &str) -> Option<String> {
    let trimmed = url_s.trim();
    if trimmed.is_empty() || trimmed.starts_with("mailto:") || trimmed.starts_with("tel:") {
        return None;
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = StdUrl::parse(&with_scheme).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.trim_end_matches('.');
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() || !host.contains('.') || is_ip_address(host) {
        return None;
    }
    Some(host.to_string())
}

/// The label right before the public suffix: `example` for
/// `foo.example.co.uk`. Accepts a bare domain or a full URL.
pub fn brand_token(domain: &str) -> Option<String> {
    registrable_domain(domain)
        .and_then(|d| d.split('.').next().map(|s| s.to_string()))
        .filter(|s| !s.is_empty())
}

/// True if the URL's host belongs to a shared listing/social/site-builder
/// platform.
pub fn is_aggregator(url_s: &str) -> bool {
    let host = match normalized_host(url_s) {
        Some(h) => h,
        None => return false,
    };
    is_aggregator_domain(&host)
}

/// Same check against an already-extracted domain or host.
pub fn is_aggregator_domain(domain: &str) -> bool {
    let domain = domain.trim().to_lowercase();
    AGGREGATOR_DOMAINS
        .iter()
        .any(|d| domain == *d || domain.ends_with(&format!(".{}", d)))
}

/// Registrable domain of `url_s` unless it is an aggregator.
pub fn identity_domain(url_s: &str) -> Option<String> {
    if is_aggregator(url_s) {
        return None;
    }
    registrable_domain(url_s).filter(|d| !is_aggregator_domain(d))
}

/// Classifies how two websites relate. Aggregator websites count as absent.
/// `name_similarity` decides the substring case.
pub fn compare_domains(
    query_website: Option<&str>,
    candidate_website: Option<&str>,
    name_similarity: f64,
) -> DomainComparison {
    let query = query_website.and_then(identity_domain);
    let candidate = candidate_website.and_then(identity_domain);

    match (query, candidate) {
        (None, None) => DomainComparison::NeitherPresent,
        (Some(_), None) => DomainComparison::CandidateMissing,
        (None, Some(_)) => DomainComparison::QueryMissing,
        (Some(q), Some(c)) => {
            if q == c {
                return DomainComparison::ExactMatch;
            }
            let (qb, cb) = match (brand_token(&q), brand_token(&c)) {
                (Some(qb), Some(cb)) => (qb, cb),
                _ => return DomainComparison::Unrelated,
            };
            if qb == cb {
                DomainComparison::SameBaseDifferentTld
            } else if qb.contains(cb.as_str()) || cb.contains(qb.as_str()) {
                if name_similarity >= 0.90 {
                    DomainComparison::SubstringStrongName
                } else {
                    DomainComparison::SubstringWeakName
                }
            } else {
                DomainComparison::Unrelated
            }
        }
    }
}

pub fn is_ip_address(domain_candidate: &str) -> bool {
    if domain_candidate.split('.').count() == 4
        && domain_candidate
            .split('.')
            .all(|part| part.parse::<u8>().is_ok())
    {
        return true;
    }
    domain_candidate.contains(':') || domain_candidate.starts_with('[')
}
