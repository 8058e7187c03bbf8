//! Report sections from retrieved evidence, shaped by the mode's template

use super::report::{ChartKind, ChartPoint, ChartRequest, ReportSection};
use super::{plural, Draft};
use crate::retrieval::EvidenceHit;
use crate::router::{ModeProfile, NarrativeTemplate};

const MAX_QUOTES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grouping {
    Month,
    Brand,
    Product,
    RatingBand,
    Single(&'static str),
}

fn grouping(template: NarrativeTemplate) -> Grouping {
    match template {
        NarrativeTemplate::MonthlyTrend => Grouping::Month,
        NarrativeTemplate::BrandProfile => Grouping::Brand,
        NarrativeTemplate::IssueDigest => Grouping::Product,
        NarrativeTemplate::DriverAnalysis | NarrativeTemplate::PriceAndPromotion => {
            Grouping::RatingBand
        }
        NarrativeTemplate::PersonaPortrait => Grouping::Single("Customer voices"),
        NarrativeTemplate::GeneralSummary => Grouping::Single("Relevant reviews"),
    }
}

fn rating_band(rating: Option<i32>) -> (u8, &'static str) {
    match rating {
        Some(r) if r >= 4 => (0, "Satisfied reviewers"),
        Some(3) => (1, "Neutral reviewers"),
        Some(_) => (2, "Dissatisfied reviewers"),
        None => (3, "Unrated reviews"),
    }
}

/// (sort key, title) for a hit; `None` sort keys keep first-appearance order
fn group_of(grouping: Grouping, hit: &EvidenceHit) -> (Option<String>, String) {
    match grouping {
        Grouping::Month => {
            let month = hit
                .date
                .map(|d| d.format("%Y-%m").to_string())
                .unwrap_or_else(|| "undated".to_string());
            (Some(month.clone()), month)
        }
        Grouping::Brand => (None, hit.brand.clone().unwrap_or_else(|| "Unknown brand".to_string())),
        Grouping::Product => (
            None,
            format!(
                "Reported issues: {}",
                hit.product.as_deref().unwrap_or("unknown product")
            ),
        ),
        Grouping::RatingBand => {
            let (order, title) = rating_band(hit.rating);
            (Some(order.to_string()), title.to_string())
        }
        Grouping::Single(title) => (None, title.to_string()),
    }
}

fn quote(hit: &EvidenceHit) -> String {
    let mut source: Vec<String> = Vec::new();
    source.extend(hit.brand.clone());
    source.extend(hit.product.clone());
    source.extend(hit.date.map(|d| d.format("%Y-%m-%d").to_string()));
    source.extend(hit.rating.map(|r| format!("rated {}", r)));

    if source.is_empty() {
        format!("- \"{}\"", hit.text)
    } else {
        format!("- \"{}\" ({})", hit.text, source.join(", "))
    }
}

fn summary_line(hits: &[&EvidenceHit]) -> String {
    let ratings: Vec<i32> = hits.iter().filter_map(|h| h.rating).collect();
    let mut line = plural(hits.len(), "review");
    if !ratings.is_empty() {
        let mean = ratings.iter().map(|&r| f64::from(r)).sum::<f64>() / ratings.len() as f64;
        line.push_str(&format!("; average rating {:.2}", mean));
        if ratings.len() < hits.len() {
            line.push_str(&format!(" across {} rated", ratings.len()));
        }
    }
    line
}

pub(super) fn draft(profile: &ModeProfile, hits: &[EvidenceHit]) -> Draft {
    let grouping = grouping(profile.template);

    let mut groups: Vec<(Option<String>, String, Vec<&EvidenceHit>)> = Vec::new();
    for hit in hits {
        let (order, title) = group_of(grouping, hit);
        match groups.iter_mut().find(|(_, t, _)| *t == title) {
            Some((_, _, members)) => members.push(hit),
            None => groups.push((order, title, vec![hit])),
        }
    }
    // stable: unordered groupings keep closest-first order
    groups.sort_by(|a, b| a.0.cmp(&b.0));

    let sections: Vec<ReportSection> = groups
        .iter()
        .map(|(_, title, members)| {
            let mut lines = vec![summary_line(members)];
            lines.extend(members.iter().take(MAX_QUOTES).map(|h| quote(h)));
            ReportSection::measured(
                title.clone(),
                lines.join("\n"),
                members.len(),
                profile.min_evidence,
            )
        })
        .collect();

    let mut charts = Vec::new();
    if matches!(grouping, Grouping::Month | Grouping::Brand) && !groups.is_empty() {
        let (kind, x_label) = match grouping {
            Grouping::Month => (ChartKind::Line, "month"),
            _ => (ChartKind::Bar, "brand"),
        };
        charts.push(ChartRequest {
            kind,
            title: format!("matching reviews by {}", x_label),
            x_label: x_label.to_string(),
            y_label: "reviews".to_string(),
            points: groups
                .iter()
                .map(|(_, title, members)| ChartPoint {
                    x: title.clone(),
                    series: None,
                    y: members.len() as f64,
                })
                .collect(),
        });
    }

    Draft {
        sections,
        charts,
        sample_size: hits.len(),
        min_evidence: profile.min_evidence,
        source_note: format!(
            "All excerpts are quoted from the {} closest to the question.",
            plural(hits.len(), "review")
        ),
    }
}
