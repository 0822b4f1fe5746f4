use chrono::SecondsFormat;

use crate::models::AttackResult;
use crate::pipeline::StatisticsSnapshot;

/// Discord rejects messages over 2000 characters.
pub const MESSAGE_LIMIT: usize = 2000;

pub fn format_result(result: &AttackResult) -> String {
    let target = &result.target;
    let program = &target.subdomain.program;
    let mut out = String::new();

    out.push_str("----------[VULN REPORT]----------\n");
    out.push_str(&format!(
        "[Attack Started]: {}\n[Attack Stopped]: {}\n[Time Elapsed]: {}ms\n\n",
        result.time_started.to_rfc3339_opts(SecondsFormat::Secs, true),
        result.time_stopped.to_rfc3339_opts(SecondsFormat::Secs, true),
        result.elapsed().num_milliseconds(),
    ));
    out.push_str(&format!(
        "[Program Info]:\n    Name:         {}\n    Platform:     {}\n    Program URL:  {}\n    Has Bounties: {}\n\n",
        program.name, program.platform, program.url, program.offers_bounties,
    ));
    out.push_str(&format!(
        "[Target Info]:\n    Subdomain: {}\n    URL: \"{}\"\n\n",
        target.subdomain.hostname, target.url,
    ));
    out.push_str(&format!("[Vulns Found]: {}\n\n", result.vulns.len()));

    for (i, vuln) in result.vulns.iter().enumerate() {
        out.push_str(&format!("[Vuln {}]:\n    Name:    {}\n    Details: {}\n    Headers:\n", i + 1, vuln.kind, vuln.details));
        for header in &vuln.offending_headers {
            out.push_str(&format!("        \"{header}\"\n"));
        }
        let impact: Vec<String> = vuln.impact.iter().map(ToString::to_string).collect();
        out.push_str(&format!(
            "    Impact:   {}\n    Found At: {}\n\n",
            impact.join(", "),
            vuln.time_found.to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
    }
    out
}

pub fn format_status(snapshot: &StatisticsSnapshot) -> String {
    format!(
        "----------[STATUS UPDATE]----------\n\
         [Time Started]: {}\n\
         [Programs]:   seen {}\n\
         [Subdomains]: fetched {}, crawled {}\n\
         [Targets]:    fetched {}, attacked {}\n\
         [Vulns]:      found {}, reported {}\n\
         [Errors]:     transport {}\n",
        snapshot.started.to_rfc3339_opts(SecondsFormat::Secs, true),
        snapshot.programs_seen,
        snapshot.subdomains_fetched,
        snapshot.subdomains_crawled,
        snapshot.targets_fetched,
        snapshot.targets_attacked,
        snapshot.vulns_found,
        snapshot.vulns_reported,
        snapshot.transport_errors,
    )
}

/// Split `text` on line boundaries into pieces of at most `limit` bytes. A single line longer
/// than `limit` is cut at character boundaries.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for line in text.split_inclusive('\n') {
        if current.len() + line.len() > limit && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }
        if line.len() <= limit {
            current.push_str(line);
            continue;
        }
        for ch in line.chars() {
            if current.len() + ch.len_utf8() > limit {
                pieces.push(std::mem::take(&mut current));
            }
            current.push(ch);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
