//! Report page layouts.
//!
//! Both reports share one outline: Executive Summary, Discovery, Sending
//! Health Analysis and Resolution Plan. Sections the auditor fills in by hand
//! carry placeholder paragraphs. The final report adds the content spam
//! score and flags any fallback data.

use crate::metrics::ReportMetrics;
use mailaudit_core::Block;

const NOTE: &str = "⚠️ NOTE:";

/// Heading placed above the dashboard screenshots.
pub const SCREENSHOTS_HEADING: &str = "Google Postmaster Screenshots";

/// Report written once the placement test completes.
#[must_use]
pub fn initial_report(metrics: &ReportMetrics) -> Vec<Block> {
    let mut blocks = Vec::new();
    preamble(&mut blocks);

    blocks.push(Block::h1("Sending Health Analysis"));
    blocks.push(Block::h2("Inbox Placement Rate (IPR)"));
    blocks.push(Block::paragraph(format!(
        "Based on the GlockApps testing results, the current inbox placement rate stands at {:.1}%. \
         This represents the percentage of emails that successfully reached recipients' primary \
         inbox folders during the audit period.",
        metrics.inbox_rate
    )));
    blocks.push(Block::h2("Spam Rate"));
    blocks.push(Block::paragraph(format!(
        "The spam placement rate is currently {:.1}%, indicating the percentage of emails that \
         were flagged as spam by various email providers. Additionally, {:.1}% of emails were not \
         delivered at all, which may indicate technical delivery issues or provider rejections.",
        metrics.spam_placement, metrics.not_delivered_rate
    )));
    reputation_sections(&mut blocks);
    authentication_bullets(&mut blocks, metrics);
    blocks.push(Block::h2("Blacklists"));
    blacklist_bullets(&mut blocks, metrics);
    email_structure(&mut blocks);
    blocks.push(Block::Divider);

    resolution_plan(&mut blocks);
    tracing::debug!(blocks = blocks.len(), "Built initial audit report");
    blocks
}

/// Report written at the end of the audit.
#[must_use]
pub fn final_report(metrics: &ReportMetrics) -> Vec<Block> {
    let mut blocks = Vec::new();
    preamble(&mut blocks);

    blocks.push(Block::h1("Sending Health Analysis"));
    blocks.push(Block::h2("Inbox Placement Rate (IPR)"));
    if metrics.placement_fallback {
        blocks.push(Block::paragraph(format!(
            "{NOTE} GlockApps testing failed during this audit. The system is using fallback \
             values for analysis. The current inbox placement rate shows {:.1}%, but this \
             represents fallback data due to GlockApps API failure.",
            metrics.inbox_rate
        )));
        blocks.push(Block::paragraph(
            "Recommendation: Re-run this audit when GlockApps service is available for accurate \
             deliverability metrics.",
        ));
    } else {
        blocks.push(Block::paragraph(format!(
            "The automated email audit system has analyzed the domain's email deliverability \
             performance. Based on the GlockApps testing results, the current inbox placement \
             rate stands at {:.1}%. This represents the percentage of emails that successfully \
             reached recipients' primary inbox folders during the audit period.",
            metrics.inbox_rate
        )));
    }

    blocks.push(Block::h2("Spam Rate"));
    if metrics.placement_fallback {
        blocks.push(Block::paragraph(format!(
            "The spam placement rate shows {:.1}% based on fallback data. {NOTE} This represents \
             fallback values due to GlockApps API failure and should not be considered accurate \
             for decision-making.",
            metrics.spam_placement
        )));
    } else {
        blocks.push(Block::paragraph(format!(
            "The spam placement rate is currently {:.1}%, indicating the percentage of emails \
             that were flagged as spam by various email providers. The overall spam rate from \
             the audit is {:.1}%.",
            metrics.spam_placement, metrics.spam_rate
        )));
    }

    reputation_sections(&mut blocks);
    if metrics.placement_fallback {
        blocks.push(Block::h2("DNS Authentication"));
        blocks.push(Block::paragraph(format!(
            "{NOTE} DNS authentication data is based on fallback values due to GlockApps API \
             failure. These results may not reflect the actual current DNS configuration."
        )));
        auth_bullets(&mut blocks, metrics);
    } else {
        authentication_bullets(&mut blocks, metrics);
    }

    blocks.push(Block::h2("Blacklists"));
    if metrics.blacklist_fallback() {
        blocks.push(Block::paragraph(format!(
            "{NOTE} Blacklist data may be based on fallback values if the blacklist checker \
             failed during this audit."
        )));
    }
    blacklist_bullets(&mut blocks, metrics);
    email_structure(&mut blocks);

    blocks.push(Block::h2("Content Spam Score"));
    let score = metrics.spam_score.unwrap_or(0.0);
    let band = metrics.deliverability.as_deref().unwrap_or("Unknown");
    if metrics.spam_scan_fallback() {
        blocks.push(Block::paragraph(format!(
            "{NOTE} The PostmarkApp SpamCheck analysis could not be completed during this audit. \
             The content spam score of {score} is a fallback value and does not reflect the \
             email content."
        )));
    } else {
        blocks.push(Block::paragraph(format!(
            "The PostmarkApp SpamCheck analysis has evaluated the email content quality and \
             deliverability. The current content spam score is {score}, which indicates {band} \
             deliverability performance. This score reflects the overall quality and compliance \
             of the email content with industry best practices."
        )));
    }
    blocks.push(Block::Divider);

    resolution_plan(&mut blocks);
    tracing::debug!(blocks = blocks.len(), "Built final audit report");
    blocks
}

/// Heading placed above the dashboard screenshots.
#[must_use]
pub fn screenshots_heading() -> Block {
    Block::h2(SCREENSHOTS_HEADING)
}

/// Paragraph appended when the dashboard screenshots could not be captured.
#[must_use]
pub fn missing_screenshots_note() -> Block {
    Block::paragraph(
        "⚠️ Note: Postmaster screenshots could not be captured due to technical issues. The \
         audit data above is complete, but visual dashboard information is unavailable.",
    )
}

fn preamble(blocks: &mut Vec<Block>) {
    blocks.push(Block::h1("Executive Summary"));
    blocks.push(Block::paragraph(
        "(Manual Entry: A high-level summary of the findings and the most critical \
         recommendations for the client.)",
    ));
    blocks.push(Block::Divider);

    blocks.push(Block::h1("Discovery"));
    blocks.push(Block::h2("Client Goals"));
    blocks.push(Block::paragraph(
        "(Manual Entry: Note the client's stated objectives, e.g., 'Improve IPR for marketing \
         emails.')",
    ));
    blocks.push(Block::h2("Current Infrastructure"));
    blocks.push(Block::paragraph(
        "(Manual Entry: Note the client's ESP, sending tools, etc., e.g., 'Sales: Apollo + \
         SendGrid.')",
    ));
    blocks.push(Block::h2("Email Volume and Frequency"));
    blocks.push(Block::paragraph(
        "(Manual Entry: e.g., 'Sends 10k marketing emails per week.')",
    ));
    blocks.push(Block::Divider);
}

fn reputation_sections(blocks: &mut Vec<Block>) {
    blocks.push(Block::h2("Bounce Rate"));
    blocks.push(Block::paragraph(
        "(Manual Entry: Add the bounce rate table from the client's ESP.)",
    ));
    blocks.push(Block::h2("IP and Domain Reputation"));
    blocks.push(Block::paragraph(
        "(The Domain Reputation and IP Reputation properties are populated automatically. Add \
         the reputation chart here.)",
    ));
}

fn authentication_bullets(blocks: &mut Vec<Block>, metrics: &ReportMetrics) {
    blocks.push(Block::h2("DNS Authentication"));
    auth_bullets(blocks, metrics);
}

fn auth_bullets(blocks: &mut Vec<Block>, metrics: &ReportMetrics) {
    let rows = [
        ("SPF", &metrics.spf, "Sender Policy Framework record"),
        ("DKIM", &metrics.dkim, "DomainKeys Identified Mail signature"),
        (
            "DMARC",
            &metrics.dmarc,
            "Domain-based Message Authentication, Reporting & Conformance policy",
        ),
    ];
    for (name, verdict, mechanism) in rows {
        let assessment = if verdict.eq_ignore_ascii_case("pass") {
            "is configured and authenticating successfully."
        } else {
            "did not pass and needs review."
        };
        blocks.push(Block::bullet(format!(
            "{name} Status: {} - The {mechanism} {assessment}",
            verdict.to_uppercase()
        )));
    }
}

fn blacklist_bullets(blocks: &mut Vec<Block>, metrics: &ReportMetrics) {
    let listed = |status: &str| status.starts_with("BLACKLISTED");
    blocks.push(Block::bullet(format!(
        "IP Blacklist Status: {} - {}",
        metrics.ip_blacklist,
        if listed(&metrics.ip_blacklist) {
            "The sending IP address is listed on one or more blacklists."
        } else {
            "The sending IP address shows no significant blacklist detections."
        }
    )));
    blocks.push(Block::bullet(format!(
        "Domain Blacklist Status: {} - {}",
        metrics.domain_blacklist,
        if listed(&metrics.domain_blacklist) {
            "The domain name is listed on one or more blacklists."
        } else {
            "The domain name is not currently listed on major email blacklists."
        }
    )));
}

fn email_structure(blocks: &mut Vec<Block>) {
    blocks.push(Block::h2("Email Structure"));
    blocks.push(Block::paragraph(
        "(Manual Entry: Analysis of the text-to-HTML ratio and tracking scripts.)",
    ));
}

fn resolution_plan(blocks: &mut Vec<Block>) {
    blocks.push(Block::h1("Resolution Plan"));
    blocks.push(Block::paragraph(
        "(Manual Entry: Actionable recommendations referencing the data above. For example: \
         '1. Reduce the spam complaint rate by pausing cold outreach.' '2. Perform list \
         maintenance and segment out unengaged users.')",
    ));
}
