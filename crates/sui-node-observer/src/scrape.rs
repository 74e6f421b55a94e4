// Numan Thabit 2025
//! Prometheus text-exposition scrape decoded into the node's metric fields.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use reqwest::Client;

/// One line of the exposition: `name{label="value",...} value [timestamp]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// Values decoded from a single scrape. `None` means the node did not export
/// the metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapeSample {
    pub total_transaction_certificates: Option<u64>,
    pub total_transaction_effects: Option<u64>,
    pub highest_known_checkpoint: Option<u64>,
    pub highest_synced_checkpoint: Option<u64>,
    pub last_executed_checkpoint: Option<u64>,
    pub current_round: Option<u64>,
    pub highest_received_round: Option<u64>,
    pub last_committed_round: Option<u64>,
    pub certificates_created: Option<u64>,
    pub number_of_peers: Option<u64>,
    pub current_epoch: Option<u64>,
    pub epoch_total_duration: Option<u64>,
    pub current_voting_right: Option<f64>,
    pub last_certificate_age: Option<f64>,
    pub uptime_secs: Option<u64>,
    pub version: Option<String>,
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Certificates,
    Effects,
    HighestKnownCheckpoint,
    HighestSyncedCheckpoint,
    LastExecutedCheckpoint,
    CurrentRound,
    HighestReceivedRound,
    LastCommittedRound,
    CertificatesCreated,
    Peers,
    Epoch,
    EpochDuration,
    VotingRight,
    CertificateAge,
    Uptime,
}

const FIELDS: &[(&str, Field)] = &[
    ("total_transaction_certificates", Field::Certificates),
    ("total_transaction_effects", Field::Effects),
    ("highest_known_checkpoint", Field::HighestKnownCheckpoint),
    ("highest_synced_checkpoint", Field::HighestSyncedCheckpoint),
    ("last_executed_checkpoint", Field::LastExecutedCheckpoint),
    ("current_round", Field::CurrentRound),
    ("highest_received_round", Field::HighestReceivedRound),
    ("last_committed_round", Field::LastCommittedRound),
    ("certificates_created", Field::CertificatesCreated),
    ("number_of_peers", Field::Peers),
    ("current_epoch", Field::Epoch),
    ("epoch_total_duration", Field::EpochDuration),
    ("current_voting_right", Field::VotingRight),
    ("last_certificate_age", Field::CertificateAge),
    ("uptime", Field::Uptime),
];

pub async fn fetch(client: &Client, url: &str) -> Result<ScrapeSample> {
    let response = client
        .get(url)
        .send()
        .await
        .context("metrics request failed")?;
    if !response.status().is_success() {
        anyhow::bail!("metrics endpoint returned status {}", response.status());
    }
    let body = response
        .text()
        .await
        .context("failed to read metrics body")?;
    Ok(decode(&body))
}

/// Map the exposition onto [`ScrapeSample`]. The first sample of each known
/// metric wins; unknown metrics are ignored.
pub fn decode(text: &str) -> ScrapeSample {
    let mut out = ScrapeSample::default();
    for sample in parse_exposition(text) {
        let Some((_, field)) = FIELDS.iter().find(|(name, _)| *name == sample.name) else {
            continue;
        };
        let value = sample.value;
        match field {
            Field::Certificates => first(&mut out.total_transaction_certificates, value),
            Field::Effects => first(&mut out.total_transaction_effects, value),
            Field::HighestKnownCheckpoint => first(&mut out.highest_known_checkpoint, value),
            Field::HighestSyncedCheckpoint => first(&mut out.highest_synced_checkpoint, value),
            Field::LastExecutedCheckpoint => first(&mut out.last_executed_checkpoint, value),
            Field::CurrentRound => first(&mut out.current_round, value),
            Field::HighestReceivedRound => first(&mut out.highest_received_round, value),
            Field::LastCommittedRound => first(&mut out.last_committed_round, value),
            Field::CertificatesCreated => first(&mut out.certificates_created, value),
            Field::Peers => first(&mut out.number_of_peers, value),
            Field::Epoch => first(&mut out.current_epoch, value),
            Field::EpochDuration => first(&mut out.epoch_total_duration, value),
            Field::VotingRight => {
                if out.current_voting_right.is_none() && value.is_finite() {
                    out.current_voting_right = Some(value);
                }
            }
            Field::CertificateAge => {
                if out.last_certificate_age.is_none() && value.is_finite() {
                    out.last_certificate_age = Some(value);
                }
            }
            Field::Uptime => {
                if out.uptime_secs.is_some() {
                    continue;
                }
                first(&mut out.uptime_secs, value);
                if let Some(label) = sample.labels.get("version") {
                    let (version, commit) = split_version(label);
                    out.version = Some(version);
                    out.commit = commit;
                }
            }
        }
    }
    out
}

fn first(slot: &mut Option<u64>, value: f64) {
    if slot.is_none() && value.is_finite() && value >= 0.0 {
        *slot = Some(value as u64);
    }
}

/// `1.24.1-8d5b1ab3c2` splits into version `1.24.1` and commit `8d5b1ab3c2`.
pub fn split_version(label: &str) -> (String, Option<String>) {
    match label.split_once('-') {
        Some((version, commit)) if !commit.is_empty() => {
            (version.to_string(), Some(commit.to_string()))
        }
        _ => (label.to_string(), None),
    }
}

pub fn parse_exposition(text: &str) -> Vec<Sample> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let sample = parse_line(line);
            if sample.is_none() {
                tracing::trace!(line, "skipping malformed exposition line");
            }
            sample
        })
        .collect()
}

fn parse_line(line: &str) -> Option<Sample> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if name.is_empty() {
        return None;
    }
    let mut rest = &line[name_end..];
    let mut labels = BTreeMap::new();
    if let Some(stripped) = rest.strip_prefix('{') {
        let (parsed, remaining) = parse_labels(stripped)?;
        labels = parsed;
        rest = remaining;
    }
    let value = rest.split_whitespace().next()?.parse::<f64>().ok()?;
    Some(Sample {
        name: name.to_string(),
        labels,
        value,
    })
}

/// Parses `key="value",...}` and returns the labels plus the text after `}`.
fn parse_labels(input: &str) -> Option<(BTreeMap<String, String>, &str)> {
    let mut labels = BTreeMap::new();
    let mut rest = input.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix('}') {
            return Some((labels, after));
        }
        let eq = rest.find('=')?;
        let key = rest[..eq].trim().to_string();
        rest = rest[eq + 1..].trim_start().strip_prefix('"')?;

        let mut value = String::new();
        let mut chars = rest.char_indices();
        let close = loop {
            let (idx, c) = chars.next()?;
            match c {
                '\\' => match chars.next()?.1 {
                    'n' => value.push('\n'),
                    other => value.push(other),
                },
                '"' => break idx,
                other => value.push(other),
            }
        };
        labels.insert(key, value);
        rest = rest[close + 1..].trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after.trim_start();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPOSITION: &str = r#"
# HELP total_transaction_certificates Total number of transaction certificates handled.
# TYPE total_transaction_certificates counter
total_transaction_certificates 1.234567e6
total_transaction_effects 1234500
highest_known_checkpoint 48210
highest_synced_checkpoint 48205
last_executed_checkpoint 48200
current_round{authority="0xabc"} 9071
number_of_peers 37
current_voting_right 0.0123
last_certificate_age NaN
# TYPE uptime counter
uptime{chain_identifier="35834a8a",is_docker="false",os_version="linux",process="validator",version="1.24.1-8d5b1ab3c2"} 86400
uptime{version="0.0.0-old"} 1
unrelated_metric{path="/a\"b"} 5
"#;

    #[test]
    fn decodes_known_fields() {
        let sample = decode(EXPOSITION);
        assert_eq!(sample.total_transaction_certificates, Some(1_234_567));
        assert_eq!(sample.total_transaction_effects, Some(1_234_500));
        assert_eq!(sample.highest_known_checkpoint, Some(48_210));
        assert_eq!(sample.highest_synced_checkpoint, Some(48_205));
        assert_eq!(sample.last_executed_checkpoint, Some(48_200));
        assert_eq!(sample.current_round, Some(9_071));
        assert_eq!(sample.number_of_peers, Some(37));
        assert_eq!(sample.current_voting_right, Some(0.0123));
        assert_eq!(sample.last_certificate_age, None);
        assert_eq!(sample.highest_received_round, None);
    }

    #[test]
    fn uptime_version_label_splits_into_version_and_commit() {
        let sample = decode(EXPOSITION);
        assert_eq!(sample.uptime_secs, Some(86_400));
        assert_eq!(sample.version.as_deref(), Some("1.24.1"));
        assert_eq!(sample.commit.as_deref(), Some("8d5b1ab3c2"));
    }

    #[test]
    fn split_version_without_commit() {
        assert_eq!(split_version("1.24.1"), ("1.24.1".to_string(), None));
        assert_eq!(split_version("1.24.1-"), ("1.24.1-".to_string(), None));
    }

    #[test]
    fn parses_escaped_label_values() {
        let samples = parse_exposition(EXPOSITION);
        let unrelated = samples
            .iter()
            .find(|sample| sample.name == "unrelated_metric")
            .expect("unrelated metric parsed");
        assert_eq!(unrelated.labels.get("path").map(String::as_str), Some("/a\"b"));
        assert_eq!(unrelated.value, 5.0);
    }

    #[test]
    fn skips_malformed_lines() {
        let samples = parse_exposition("good 1\nbad{unterminated=\"x 2\nworse notanumber\n{} 3\n");
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "good");
    }

    #[test]
    fn ignores_timestamps_and_negative_counters() {
        let sample = decode("current_epoch 412 1700000000000\nnumber_of_peers -3\n");
        assert_eq!(sample.current_epoch, Some(412));
        assert_eq!(sample.number_of_peers, None);
    }
}
