//! Battle participation counts from the killboard statistics API.

use std::collections::BTreeMap;

use super::fetch::JsonSource;
use crate::attendance::IntervalBuckets;
use crate::config::NetworkConfig;
use crate::logging::SharedSink;

/// Sums each player's `battleNumber` per interval across every guild.
pub fn fetch_killboard(
    source: &dyn JsonSource,
    config: &NetworkConfig,
    intervals: &[u32],
    sink: &SharedSink,
) -> IntervalBuckets {
    let mut buckets: IntervalBuckets = intervals.iter().map(|&i| (i, BTreeMap::new())).collect();

    for &interval in intervals {
        for guild in &config.guilds {
            let url = match reqwest::Url::parse_with_params(
                &config.killboard_url,
                &[
                    ("guildSearch", guild.name.clone()),
                    ("interval", interval.to_string()),
                    ("minGP", config.min_gp.to_string()),
                ],
            ) {
                Ok(url) => url,
                Err(e) => {
                    sink.error(&format!("Invalid killboard URL {}: {}", config.killboard_url, e));
                    return buckets;
                }
            };

            let context = format!("{} at {}d", guild.name, interval);
            let data = match source.get_json(url.as_str(), &context) {
                Ok(data) => data,
                Err(e) => {
                    sink.warn(&e.to_string());
                    continue;
                }
            };
            let Some(players) = data.as_array() else {
                continue;
            };

            let bucket = buckets.entry(interval).or_default();
            for player in players {
                let name = player.get("name").and_then(|n| n.as_str());
                let battles = player.get("battleNumber").and_then(|b| b.as_u64());
                if let (Some(name), Some(battles)) = (name, battles) {
                    let count = bucket.entry(name.to_string()).or_insert(0);
                    *count = count.saturating_add(u32::try_from(battles).unwrap_or(u32::MAX));
                }
            }
        }
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuildInfo;
    use crate::logging::MemorySink;
    use crate::roster::fetch::testing::ScriptedSource;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_battles_sum_across_guilds() {
        let config = NetworkConfig {
            guilds: vec![
                GuildInfo {
                    name: "Griffin Empire".to_string(),
                    id: "a".to_string(),
                },
                GuildInfo {
                    name: "Wyverns".to_string(),
                    id: "b".to_string(),
                },
            ],
            killboard_url: "https://kb.test/player".to_string(),
            min_gp: 50,
            ..NetworkConfig::default()
        };
        let source = ScriptedSource::default()
            .with(
                "https://kb.test/player?guildSearch=Griffin+Empire&interval=7&minGP=50",
                json!([{"name": "Alice", "battleNumber": 3}, {"name": "Bob", "battleNumber": "x"}]),
            )
            .with(
                "https://kb.test/player?guildSearch=Wyverns&interval=7&minGP=50",
                json!([{"name": "Alice", "battleNumber": 2}]),
            );
        let sink: SharedSink = Arc::new(MemorySink::new());

        let buckets = fetch_killboard(&source, &config, &[7, 14], &sink);

        assert_eq!(buckets[&7].get("Alice"), Some(&5));
        assert_eq!(buckets[&7].get("Bob"), None);
        assert!(buckets[&14].is_empty());
        assert_eq!(source.requested.borrow().len(), 4);
    }

    #[test]
    fn test_oversized_battle_count_saturates() {
        let config = NetworkConfig {
            guilds: vec![GuildInfo {
                name: "Wyverns".to_string(),
                id: "b".to_string(),
            }],
            killboard_url: "https://kb.test/player".to_string(),
            min_gp: 0,
            ..NetworkConfig::default()
        };
        let source = ScriptedSource::default().with(
            "https://kb.test/player?guildSearch=Wyverns&interval=7&minGP=0",
            json!([
                {"name": "Alice", "battleNumber": 5_000_000_000u64},
                {"name": "Alice", "battleNumber": 1},
                {"name": "Bob", "battleNumber": 4_294_967_296u64}
            ]),
        );
        let sink: SharedSink = Arc::new(MemorySink::new());

        let buckets = fetch_killboard(&source, &config, &[7], &sink);

        assert_eq!(buckets[&7]["Alice"], u32::MAX);
        assert_eq!(buckets[&7]["Bob"], u32::MAX);
    }
}
