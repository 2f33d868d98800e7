use std::collections::BTreeMap;

use super::fetch::JsonSource;
use crate::cache::{CacheStore, CacheType};
use crate::config::GuildInfo;
use crate::logging::SharedSink;

/// Player name to guild name.
pub type Roster = BTreeMap<String, String>;

/// Resolves the current member list, cache first.
pub struct RosterProvider<'a> {
    cache: &'a CacheStore,
    source: &'a dyn JsonSource,
    members_url: String,
    guilds: Vec<GuildInfo>,
    sink: SharedSink,
}

impl<'a> RosterProvider<'a> {
    pub fn new(
        cache: &'a CacheStore,
        source: &'a dyn JsonSource,
        members_url: &str,
        guilds: Vec<GuildInfo>,
        sink: SharedSink,
    ) -> Self {
        Self {
            cache,
            source,
            members_url: members_url.trim_end_matches('/').to_string(),
            guilds,
            sink,
        }
    }

    /// Cached roster if present, else fetched and cached when non-empty.
    pub fn roster(&self) -> Roster {
        if let Some(roster) = self.cache.load::<Roster>(CacheType::MemberList) {
            if !roster.is_empty() {
                self.sink
                    .debug(&format!("Loaded {} members from cache.", roster.len()));
                return roster;
            }
        }

        let roster = self.fetch();
        self.cache.save_if_needed(CacheType::MemberList, &roster, true);
        roster
    }

    /// Fetches every configured guild's members. Guilds that fail are
    /// logged and left out.
    pub fn fetch(&self) -> Roster {
        let mut roster = Roster::new();

        for guild in &self.guilds {
            self.sink
                .info(&format!("Fetching members for guild: {}...", guild.name));
            let url = format!("{}/guilds/{}/members", self.members_url, guild.id);
            let data = match self.source.get_json(&url, &format!("{} members", guild.name)) {
                Ok(data) => data,
                Err(e) => {
                    self.sink
                        .error(&format!("No data returned for {}: {}", guild.name, e));
                    continue;
                }
            };
            let Some(players) = data.as_array() else {
                self.sink
                    .error(&format!("Unexpected member list format for {}.", guild.name));
                continue;
            };

            for player in players {
                if let Some(name) = player.get("Name").and_then(|n| n.as_str()) {
                    if !name.is_empty() {
                        roster.insert(name.to_string(), guild.name.clone());
                    }
                }
            }
            self.sink.info(&format!(
                "Successfully fetched {} members from {}.",
                players.len(),
                guild.name
            ));
        }

        roster
    }
}
