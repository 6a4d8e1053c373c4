//! Bucket construction and markdown rendering (spec.md section 4.6
//! steps 4-6).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clustering::Cluster;
use crate::traits::store::InsightWithPost;
use crate::types::{OutlineItem, OutlineSection, ReportOutline};

fn outline_item(item: &InsightWithPost) -> OutlineItem {
    OutlineItem {
        post_id: item.post.id,
        summary: item
            .insight
            .summary
            .clone()
            .unwrap_or_else(|| item.post.text.chars().take(80).collect()),
        importance: item.insight.importance.unwrap_or(1),
        tags: item.insight.tags.clone(),
    }
}

fn sort_items_within_bucket(items: &mut [(OutlineItem, DateTime<Utc>)]) {
    items.sort_by(|a, b| {
        b.0.importance
            .cmp(&a.0.importance)
            .then_with(|| b.1.cmp(&a.1))
    });
}

fn sort_sections(sections: &mut Vec<OutlineSection>) {
    sections.sort_by(|a, b| {
        b.peak_importance
            .cmp(&a.peak_importance)
            .then_with(|| b.items.len().cmp(&a.items.len()))
    });
}

/// Bucket survivors directly by one of their insight tags
/// (`groupBy=tag`, spec.md section 4.6 step 4).
pub fn build_tag_outline(items: &[InsightWithPost]) -> ReportOutline {
    let mut buckets: HashMap<&str, Vec<(OutlineItem, DateTime<Utc>)>> = HashMap::new();
    for item in items {
        let tag = item.insight.tags.first().map(|s| s.as_str()).unwrap_or("other");
        buckets
            .entry(tag)
            .or_default()
            .push((outline_item(item), item.post.source_timestamp));
    }
    let mut sections: Vec<OutlineSection> = buckets
        .into_iter()
        .map(|(tag, mut entries)| {
            sort_items_within_bucket(&mut entries);
            let peak = entries.iter().map(|(i, _)| i.importance).max().unwrap_or(0);
            OutlineSection {
                title: tag.to_string(),
                peak_importance: peak,
                items: entries.into_iter().map(|(i, _)| i).collect(),
            }
        })
        .collect();
    sort_sections(&mut sections);
    ReportOutline::Tag { sections }
}

/// Bucket survivors by author handle (`groupBy=author`).
pub fn build_author_outline(items: &[InsightWithPost]) -> ReportOutline {
    let mut buckets: HashMap<&str, Vec<(OutlineItem, DateTime<Utc>)>> = HashMap::new();
    for item in items {
        buckets
            .entry(item.post.author_handle.as_str())
            .or_default()
            .push((outline_item(item), item.post.source_timestamp));
    }
    let mut sections: Vec<OutlineSection> = buckets
        .into_iter()
        .map(|(author, mut entries)| {
            sort_items_within_bucket(&mut entries);
            let peak = entries.iter().map(|(i, _)| i.importance).max().unwrap_or(0);
            OutlineSection {
                title: author.to_string(),
                peak_importance: peak,
                items: entries.into_iter().map(|(i, _)| i).collect(),
            }
        })
        .collect();
    sort_sections(&mut sections);
    ReportOutline::Author { sections }
}

/// Bucket clusters by their primary tag (`groupBy=cluster`,
/// spec.md section 4.6 step 5). `lookup` supplies the full insight for
/// each clustered post id so items retain their summary/tags.
pub fn build_clustered_outline(clusters: &[Cluster], lookup: &HashMap<Uuid, InsightWithPost>) -> ReportOutline {
    let mut sections = Vec::new();
    for cl in clusters {
        let title = cl
            .tags
            .first()
            .cloned()
            .unwrap_or_else(|| "other".to_string());
        let mut entries: Vec<(OutlineItem, DateTime<Utc>)> = cl
            .members
            .iter()
            .filter_map(|m| lookup.get(&m.id))
            .map(|item| (outline_item(item), item.post.source_timestamp))
            .collect();
        sort_items_within_bucket(&mut entries);
        sections.push(OutlineSection {
            title,
            peak_importance: cl.peak_importance(),
            items: entries.into_iter().map(|(i, _)| i).collect(),
        });
    }
    sort_sections(&mut sections);
    ReportOutline::Clustered { sections }
}

fn star_rating(importance: u8) -> String {
    "\u{2605}".repeat(importance.clamp(1, 5) as usize)
}

fn section_heading(outline: &ReportOutline) -> &'static str {
    match outline {
        ReportOutline::Clustered { .. } => "## \u{5206}\u{7c7b}",
        ReportOutline::Tag { .. } => "## \u{5206}\u{7c7b}",
        ReportOutline::Author { .. } => "## \u{91cd}\u{70b9}\u{6d1e}\u{5bdf}",
    }
}

fn sections(outline: &ReportOutline) -> &[OutlineSection] {
    match outline {
        ReportOutline::Clustered { sections } => sections,
        ReportOutline::Tag { sections } => sections,
        ReportOutline::Author { sections } => sections,
    }
}

/// Render the markdown body for a report (spec.md section 4.6 step 6):
/// headline, time-range blockquote, overview bullets, and per-section
/// items with star ratings.
pub fn render_markdown(
    profile_name: &str,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    outline: &ReportOutline,
    total_count: usize,
    mid_triage_kept: Option<(usize, usize)>,
) -> (String, String) {
    let headline = format!("{profile_name} digest \u{2014} {total_count} items");

    let mut body = String::new();
    body.push_str(&format!("# {headline}\n\n"));
    body.push_str(&format!(
        "> {} \u{2014} {}\n\n",
        period_start.to_rfc3339(),
        period_end.to_rfc3339()
    ));

    body.push_str("## \u{6982}\u{89c8}\n\n");
    body.push_str(&format!("- total items: {total_count}\n"));
    if let Some((kept, total)) = mid_triage_kept {
        body.push_str(&format!("- mid-tier triage kept {kept} of {total}\n"));
    }
    body.push('\n');

    body.push_str(section_heading(outline));
    body.push_str("\n\n");
    for section in sections(outline) {
        body.push_str(&format!("### {}\n\n", section.title));
        for item in &section.items {
            body.push_str(&format!(
                "- {} {} ({})\n",
                star_rating(item.importance),
                item.summary,
                item.post_id
            ));
        }
        body.push('\n');
    }

    (headline, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::post::FetchedPost;
    use crate::types::{Insight, Post, Verdict};

    fn item(tag: &str, importance: u8, author: &str) -> InsightWithPost {
        let post_id = Uuid::new_v4();
        let mut post = Post::from_fetched(
            Uuid::new_v4(),
            FetchedPost {
                external_id: post_id.to_string(),
                created_at: Utc::now(),
                text: "some text".into(),
                lang: None,
                author_handle: author.into(),
                raw_metadata: serde_json::json!({}),
            },
        );
        post.id = post_id;
        let insight = Insight::new(
            post_id,
            post.external_id.clone(),
            Verdict::Watch,
            Some("summary".into()),
            Some(importance),
            vec![tag.into()],
            None,
        );
        InsightWithPost { insight, post }
    }

    #[test]
    fn tag_outline_buckets_by_first_tag() {
        let items = vec![item("policy", 5, "a"), item("markets", 3, "b")];
        let outline = build_tag_outline(&items);
        match outline {
            ReportOutline::Tag { sections } => assert_eq!(sections.len(), 2),
            _ => panic!("expected tag outline"),
        }
    }

    #[test]
    fn sections_sorted_by_peak_importance_desc() {
        let items = vec![item("policy", 2, "a"), item("markets", 5, "b")];
        let outline = build_tag_outline(&items);
        match outline {
            ReportOutline::Tag { sections } => assert_eq!(sections[0].title, "markets"),
            _ => panic!("expected tag outline"),
        }
    }

    #[test]
    fn markdown_contains_expected_sections() {
        let items = vec![item("policy", 5, "a")];
        let outline = build_tag_outline(&items);
        let (headline, content) = render_markdown("daily", Utc::now(), Utc::now(), &outline, 1, None);
        assert!(headline.contains("daily"));
        assert!(content.contains("## \u{6982}\u{89c8}"));
        assert!(content.contains("### policy"));
    }

    #[test]
    fn star_rating_clamped_to_five() {
        assert_eq!(star_rating(7), "\u{2605}".repeat(5));
        assert_eq!(star_rating(0), "\u{2605}".repeat(1));
    }
}
