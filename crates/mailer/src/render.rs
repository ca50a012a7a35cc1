use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use faultline_core::{AlertPayload, AlertRule, Project, TeamMember};
use faultline_email::EmailMessage;
use faultline_storage::DigestEntry;

use crate::config::MailerConfig;

/// Build the unsubscribe URL for a recipient token.
#[must_use]
pub fn unsubscribe_url(config: &MailerConfig, token: Option<&str>) -> Option<String> {
    let base = config.unsubscribe_base_url.as_deref()?;
    let token = token?;
    let encoded = utf8_percent_encode(token, NON_ALPHANUMERIC);
    Some(format!("{base}?token={encoded}"))
}

/// Render an immediate alert email with full contextual insights.
#[must_use]
pub fn render_alert_email(
    config: &MailerConfig,
    project: &Project,
    rule: &AlertRule,
    alert: &AlertPayload,
    recipient: &str,
    unsubscribe: Option<&str>,
) -> EmailMessage {
    let environments = alert.environment.labels().join(", ");
    let subject = format!("[{environments}] {}", alert.title);

    let mut text = String::new();
    text.push_str(&format!("{}\n\n{}\n\n", alert.title, alert.summary));
    text.push_str(&format!(
        "Project: {}\nRule: {}\nSeverity: {}\nEnvironment: {environments}\nOccurrences: {}\nAffected users: {}\n",
        project.name, rule.name, alert.severity, alert.occurrences, alert.affected_users
    ));

    if let Some(why) = &alert.context.why_it_matters {
        text.push_str(&format!("\nWhy this matters\n{why}\n"));
    }
    if !alert.context.recent_deployments.is_empty() {
        text.push_str("\nRecent deployments\n");
        for deployment in &alert.context.recent_deployments {
            text.push_str(&format!(
                "- {} at {}\n",
                deployment.version,
                deployment.deployed_at.to_rfc3339()
            ));
        }
    }
    if !alert.context.similar_incidents.is_empty() {
        text.push_str("\nSimilar incidents\n");
        for incident in &alert.context.similar_incidents {
            text.push_str(&format!(
                "- {} ({} occurrences)\n",
                incident.message, incident.count
            ));
        }
    }
    if !alert.context.suggested_fixes.is_empty() {
        text.push_str("\nSuggested fixes\n");
        for fix in &alert.context.suggested_fixes {
            text.push_str(&format!("- {fix}\n"));
        }
    }
    if !alert.context.next_steps.is_empty() {
        text.push_str("\nNext steps\n");
        for (index, step) in alert.context.next_steps.iter().enumerate() {
            text.push_str(&format!("{}. {step}\n", index + 1));
        }
    }

    if let Some(dashboard) = &alert.links.dashboard {
        text.push_str(&format!("\nView error: {dashboard}\n"));
    }
    if let Some(acknowledge) = &alert.links.acknowledge {
        text.push_str(&format!("Acknowledge: {acknowledge}\n"));
    }
    if let Some(unsub) = unsubscribe {
        text.push_str(&format!("\nUnsubscribe: {unsub}\n"));
    }

    let html = render_alert_html(project, rule, alert, unsubscribe);

    EmailMessage {
        from: config.from.clone(),
        to: recipient.to_owned(),
        subject,
        text_body: text,
        html_body: Some(html),
    }
}

fn render_alert_html(
    project: &Project,
    rule: &AlertRule,
    alert: &AlertPayload,
    unsubscribe: Option<&str>,
) -> String {
    let environments = alert.environment.labels().join(", ");
    let mut html = String::new();
    html.push_str(&format!(
        "<h2>{}</h2><p>{}</p>",
        escape(&alert.title),
        escape(&alert.summary)
    ));
    html.push_str(&format!(
        "<table><tr><td>Project</td><td>{}</td></tr>\
         <tr><td>Rule</td><td>{}</td></tr>\
         <tr><td>Severity</td><td>{}</td></tr>\
         <tr><td>Environment</td><td>{}</td></tr>\
         <tr><td>Occurrences</td><td>{}</td></tr>\
         <tr><td>Affected users</td><td>{}</td></tr></table>",
        escape(&project.name),
        escape(&rule.name),
        alert.severity,
        escape(&environments),
        alert.occurrences,
        alert.affected_users
    ));

    if let Some(why) = &alert.context.why_it_matters {
        html.push_str(&format!("<h3>Why this matters</h3><p>{}</p>", escape(why)));
    }
    if !alert.context.recent_deployments.is_empty() {
        html.push_str("<h3>Recent deployments</h3><ul>");
        for deployment in &alert.context.recent_deployments {
            html.push_str(&format!(
                "<li>{} at {}</li>",
                escape(&deployment.version),
                deployment.deployed_at.to_rfc3339()
            ));
        }
        html.push_str("</ul>");
    }
    if !alert.context.similar_incidents.is_empty() {
        html.push_str("<h3>Similar incidents</h3><ul>");
        for incident in &alert.context.similar_incidents {
            html.push_str(&format!(
                "<li>{} ({} occurrences)</li>",
                escape(&incident.message),
                incident.count
            ));
        }
        html.push_str("</ul>");
    }
    if !alert.context.next_steps.is_empty() {
        html.push_str("<h3>Next steps</h3><ol>");
        for step in &alert.context.next_steps {
            html.push_str(&format!("<li>{}</li>", escape(step)));
        }
        html.push_str("</ol>");
    }

    if let Some(dashboard) = &alert.links.dashboard {
        html.push_str(&format!(
            "<p><a href=\"{dashboard}\">View Error</a>"
        ));
        if let Some(acknowledge) = &alert.links.acknowledge {
            html.push_str(&format!(" | <a href=\"{acknowledge}\">Acknowledge</a>"));
        }
        html.push_str("</p>");
    }
    if let Some(unsub) = unsubscribe {
        html.push_str(&format!(
            "<p><small><a href=\"{unsub}\">Unsubscribe</a></small></p>"
        ));
    }

    html
}

/// Render the periodic digest email for a member.
#[must_use]
pub fn render_digest_email(
    config: &MailerConfig,
    project: &Project,
    member: &TeamMember,
    entries: &[DigestEntry],
) -> EmailMessage {
    let cadence = member.alert_preferences.email.digest.cadence;
    let cadence_label = match cadence {
        faultline_core::DigestCadence::Daily => "daily",
        faultline_core::DigestCadence::Weekly => "weekly",
    };
    let subject = format!(
        "Your {cadence_label} error digest for {} ({} alerts)",
        project.name,
        entries.len()
    );

    let mut text = format!(
        "Alerts queued for you in {} since your last digest:\n\n",
        project.name
    );
    let mut html = format!(
        "<h2>{} digest for {}</h2><ul>",
        escape(cadence_label),
        escape(&project.name)
    );

    for entry in entries {
        let environments = entry.alert.environment.labels().join(", ");
        text.push_str(&format!(
            "- [{}] {} ({}, {} occurrences) at {}\n",
            entry.alert.severity,
            entry.alert.title,
            environments,
            entry.alert.occurrences,
            entry.created_at.to_rfc3339()
        ));
        html.push_str(&format!(
            "<li><strong>[{}]</strong> {} ({}, {} occurrences)</li>",
            entry.alert.severity,
            escape(&entry.alert.title),
            escape(&environments),
            entry.alert.occurrences
        ));
    }
    html.push_str("</ul>");

    let unsubscribe = unsubscribe_url(
        config,
        member
            .alert_preferences
            .email
            .unsubscribe_token
            .as_deref(),
    );
    if let Some(unsub) = &unsubscribe {
        text.push_str(&format!("\nUnsubscribe: {unsub}\n"));
        html.push_str(&format!(
            "<p><small><a href=\"{unsub}\">Unsubscribe</a></small></p>"
        ));
    }

    EmailMessage {
        from: config.from.clone(),
        to: member.email.clone(),
        subject,
        text_body: text,
        html_body: Some(html),
    }
}

/// Minimal HTML escaping for text interpolated into bodies.
fn escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
