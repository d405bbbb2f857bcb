//! Individual diagnostic rules (§4.5). Each rule inspects a parsed page and
//! optionally emits one `DetectedIssue`.

use crate::models::{DetectedIssue, IssueType};
use scraper::{Html, Selector};

const TITLE_MIN_LEN: usize = 30;
const TITLE_MAX_LEN: usize = 60;
const META_DESCRIPTION_MIN_LEN: usize = 70;
const META_DESCRIPTION_MAX_LEN: usize = 160;
const MIN_INTERNAL_LINKS: usize = 3;
const THIN_CONTENT_WORDS: usize = 300;
const SLOW_LCP_MS: f64 = 2500.0;
const HIGH_CLS: f64 = 0.1;

/// Parsed view of a single page's HTML, passed to every rule.
pub struct PageContext<'a> {
    pub document: &'a Html,
    pub base_host: &'a str,
    pub lcp_ms: Option<f64>,
    pub cls: Option<f64>,
}

pub trait DiagnosticRule: Send + Sync {
    fn evaluate(&self, ctx: &PageContext) -> Option<DetectedIssue>;
}

fn selector(s: &str) -> Selector {
    Selector::parse(s).expect("static selector must parse")
}

pub struct TitleRule;
impl DiagnosticRule for TitleRule {
    fn evaluate(&self, ctx: &PageContext) -> Option<DetectedIssue> {
        let sel = selector("title");
        let text = ctx
            .document
            .select(&sel)
            .next()
            .map(|e| e.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty());

        match text {
            None => Some(DetectedIssue {
                issue_type: IssueType::TitleMissing,
                severity: IssueType::TitleMissing.default_severity(),
                title: "Missing page title".to_string(),
                message: "The page has no <title> element.".to_string(),
                current_value: None,
                suggested_value: None,
            }),
            Some(t) if t.len() < TITLE_MIN_LEN => Some(DetectedIssue {
                issue_type: IssueType::TitleTooShort,
                severity: IssueType::TitleTooShort.default_severity(),
                title: "Title too short".to_string(),
                message: format!("Title is {} characters; recommended minimum is {TITLE_MIN_LEN}.", t.len()),
                current_value: Some(t),
                suggested_value: None,
            }),
            Some(t) if t.len() > TITLE_MAX_LEN => Some(DetectedIssue {
                issue_type: IssueType::TitleTooLong,
                severity: IssueType::TitleTooLong.default_severity(),
                title: "Title too long".to_string(),
                message: format!("Title is {} characters; recommended maximum is {TITLE_MAX_LEN}.", t.len()),
                current_value: Some(t),
                suggested_value: None,
            }),
            _ => None,
        }
    }
}

pub struct MetaDescriptionRule;
impl DiagnosticRule for MetaDescriptionRule {
    fn evaluate(&self, ctx: &PageContext) -> Option<DetectedIssue> {
        let sel = selector(r#"meta[name="description"]"#);
        let content = ctx
            .document
            .select(&sel)
            .next()
            .and_then(|e| e.value().attr("content"))
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        match content {
            None => Some(DetectedIssue {
                issue_type: IssueType::MetaDescriptionMissing,
                severity: IssueType::MetaDescriptionMissing.default_severity(),
                title: "Missing meta description".to_string(),
                message: "The page has no meta description tag.".to_string(),
                current_value: None,
                suggested_value: None,
            }),
            Some(c) if c.len() < META_DESCRIPTION_MIN_LEN => Some(DetectedIssue {
                issue_type: IssueType::MetaDescriptionTooShort,
                severity: IssueType::MetaDescriptionTooShort.default_severity(),
                title: "Meta description too short".to_string(),
                message: format!(
                    "Description is {} characters; recommended minimum is {META_DESCRIPTION_MIN_LEN}.",
                    c.len()
                ),
                current_value: Some(c),
                suggested_value: None,
            }),
            Some(c) if c.len() > META_DESCRIPTION_MAX_LEN => Some(DetectedIssue {
                issue_type: IssueType::MetaDescriptionTooLong,
                severity: IssueType::MetaDescriptionTooLong.default_severity(),
                title: "Meta description too long".to_string(),
                message: format!(
                    "Description is {} characters; recommended maximum is {META_DESCRIPTION_MAX_LEN}.",
                    c.len()
                ),
                current_value: Some(c),
                suggested_value: None,
            }),
            _ => None,
        }
    }
}

pub struct H1Rule;
impl DiagnosticRule for H1Rule {
    fn evaluate(&self, ctx: &PageContext) -> Option<DetectedIssue> {
        let sel = selector("h1");
        let count = ctx.document.select(&sel).count();

        if count == 0 {
            Some(DetectedIssue {
                issue_type: IssueType::H1Missing,
                severity: IssueType::H1Missing.default_severity(),
                title: "Missing H1".to_string(),
                message: "The page has no <h1> heading.".to_string(),
                current_value: None,
                suggested_value: None,
            })
        } else if count > 1 {
            Some(DetectedIssue {
                issue_type: IssueType::H1Multiple,
                severity: IssueType::H1Multiple.default_severity(),
                title: "Multiple H1 headings".to_string(),
                message: format!("Found {count} <h1> headings; pages should have exactly one."),
                current_value: Some(count.to_string()),
                suggested_value: None,
            })
        } else {
            None
        }
    }
}

pub struct ImageAltRule;
impl DiagnosticRule for ImageAltRule {
    fn evaluate(&self, ctx: &PageContext) -> Option<DetectedIssue> {
        let sel = selector("img");
        let images: Vec<_> = ctx.document.select(&sel).collect();
        let missing = images
            .iter()
            .filter(|img| img.value().attr("alt").map(|a| a.trim().is_empty()).unwrap_or(true))
            .count();

        if missing == 0 {
            return None;
        }
        Some(DetectedIssue {
            issue_type: IssueType::ImagesWithoutAlt,
            severity: IssueType::ImagesWithoutAlt.default_severity(),
            title: "Images missing alt text".to_string(),
            message: format!("{missing} of {} images have no alt attribute.", images.len()),
            current_value: Some(missing.to_string()),
            suggested_value: None,
        })
    }
}

pub struct OpenGraphRule;
impl DiagnosticRule for OpenGraphRule {
    fn evaluate(&self, ctx: &PageContext) -> Option<DetectedIssue> {
        const REQUIRED: [&str; 4] = ["og:title", "og:description", "og:image", "og:url"];
        let sel = selector("meta[property]");
        let present: Vec<String> = ctx
            .document
            .select(&sel)
            .filter_map(|e| e.value().attr("property").map(|p| p.to_string()))
            .collect();

        let missing: Vec<&str> =
            REQUIRED.iter().filter(|tag| !present.iter().any(|p| p == *tag)).copied().collect();

        if missing.is_empty() {
            return None;
        }
        Some(DetectedIssue {
            issue_type: IssueType::OpenGraphIncomplete,
            severity: IssueType::OpenGraphIncomplete.default_severity(),
            title: "Incomplete Open Graph tags".to_string(),
            message: format!("Missing Open Graph properties: {}.", missing.join(", ")),
            current_value: None,
            suggested_value: Some(missing.join(",")),
        })
    }
}

pub struct InternalLinkRule;
impl DiagnosticRule for InternalLinkRule {
    fn evaluate(&self, ctx: &PageContext) -> Option<DetectedIssue> {
        let sel = selector("a[href]");
        let internal_count = ctx
            .document
            .select(&sel)
            .filter_map(|e| e.value().attr("href"))
            .filter(|href| is_internal(href, ctx.base_host))
            .count();

        if internal_count >= MIN_INTERNAL_LINKS {
            return None;
        }
        Some(DetectedIssue {
            issue_type: IssueType::LowInternalLinkCount,
            severity: IssueType::LowInternalLinkCount.default_severity(),
            title: "Low internal link count".to_string(),
            message: format!(
                "Page has {internal_count} internal links; recommended minimum is {MIN_INTERNAL_LINKS}."
            ),
            current_value: Some(internal_count.to_string()),
            suggested_value: None,
        })
    }
}

pub struct ThinContentRule;
impl DiagnosticRule for ThinContentRule {
    fn evaluate(&self, ctx: &PageContext) -> Option<DetectedIssue> {
        let sel = selector("body");
        let word_count = ctx
            .document
            .select(&sel)
            .next()
            .map(|e| e.text().collect::<String>().split_whitespace().count())
            .unwrap_or(0);

        if word_count >= THIN_CONTENT_WORDS {
            return None;
        }
        Some(DetectedIssue {
            issue_type: IssueType::ThinContent,
            severity: IssueType::ThinContent.default_severity(),
            title: "Thin content".to_string(),
            message: format!(
                "Page body has {word_count} words; recommended minimum is {THIN_CONTENT_WORDS}."
            ),
            current_value: Some(word_count.to_string()),
            suggested_value: None,
        })
    }
}

pub struct SlowLcpRule;
impl DiagnosticRule for SlowLcpRule {
    fn evaluate(&self, ctx: &PageContext) -> Option<DetectedIssue> {
        let lcp = ctx.lcp_ms?;
        if lcp <= SLOW_LCP_MS {
            return None;
        }
        Some(DetectedIssue {
            issue_type: IssueType::SlowLcp,
            severity: IssueType::SlowLcp.default_severity(),
            title: "Slow Largest Contentful Paint".to_string(),
            message: format!("LCP is {lcp:.0}ms; recommended maximum is {SLOW_LCP_MS:.0}ms."),
            current_value: Some(format!("{lcp:.0}")),
            suggested_value: None,
        })
    }
}

pub struct HighClsRule;
impl DiagnosticRule for HighClsRule {
    fn evaluate(&self, ctx: &PageContext) -> Option<DetectedIssue> {
        let cls = ctx.cls?;
        if cls <= HIGH_CLS {
            return None;
        }
        Some(DetectedIssue {
            issue_type: IssueType::HighCls,
            severity: IssueType::HighCls.default_severity(),
            title: "High Cumulative Layout Shift".to_string(),
            message: format!("CLS is {cls:.2}; recommended maximum is {HIGH_CLS:.2}."),
            current_value: Some(format!("{cls:.2}")),
            suggested_value: None,
        })
    }
}

fn is_internal(href: &str, base_host: &str) -> bool {
    if href.starts_with('#') || href.starts_with("mailto:") || href.starts_with("tel:") {
        return false;
    }
    if href.starts_with('/') {
        return true;
    }
    reqwest::Url::parse(href)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.strip_prefix("www.").unwrap_or(h) == base_host))
        .unwrap_or(false)
}

pub fn get_all_rules() -> Vec<Box<dyn DiagnosticRule>> {
    vec![
        Box::new(TitleRule),
        Box::new(MetaDescriptionRule),
        Box::new(H1Rule),
        Box::new(ImageAltRule),
        Box::new(OpenGraphRule),
        Box::new(InternalLinkRule),
        Box::new(ThinContentRule),
        Box::new(SlowLcpRule),
        Box::new(HighClsRule),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(html: &str) -> Html {
        Html::parse_document(html)
    }

    #[test]
    fn title_missing_detected() {
        let doc = ctx("<html><head></head><body></body></html>");
        let c = PageContext { document: &doc, base_host: "example.com", lcp_ms: None, cls: None };
        let issue = TitleRule.evaluate(&c).unwrap();
        assert_eq!(issue.issue_type, IssueType::TitleMissing);
    }

    #[test]
    fn title_within_range_passes() {
        let doc = ctx("<html><head><title>A Perfectly Reasonable Page Title Here</title></head></html>");
        let c = PageContext { document: &doc, base_host: "example.com", lcp_ms: None, cls: None };
        assert!(TitleRule.evaluate(&c).is_none());
    }

    #[test]
    fn h1_multiple_detected() {
        let doc = ctx("<html><body><h1>One</h1><h1>Two</h1></body></html>");
        let c = PageContext { document: &doc, base_host: "example.com", lcp_ms: None, cls: None };
        let issue = H1Rule.evaluate(&c).unwrap();
        assert_eq!(issue.issue_type, IssueType::H1Multiple);
    }

    #[test]
    fn images_without_alt_counted() {
        let doc = ctx(r#"<html><body><img src="a.png"><img src="b.png" alt="b"></body></html>"#);
        let c = PageContext { document: &doc, base_host: "example.com", lcp_ms: None, cls: None };
        let issue = ImageAltRule.evaluate(&c).unwrap();
        assert_eq!(issue.current_value.as_deref(), Some("1"));
    }

    #[test]
    fn slow_lcp_detected_only_above_threshold() {
        let doc = ctx("<html></html>");
        let slow = PageContext { document: &doc, base_host: "example.com", lcp_ms: Some(4000.0), cls: None };
        assert!(SlowLcpRule.evaluate(&slow).is_some());
        let fast = PageContext { document: &doc, base_host: "example.com", lcp_ms: Some(1000.0), cls: None };
        assert!(SlowLcpRule.evaluate(&fast).is_none());
    }
}
