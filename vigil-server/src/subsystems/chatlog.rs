//! Chat activity collection for the reporting window
//!
//! Walks every channel the bot belongs to, pulls the history slice for the
//! window, and renders each message as `display name: text`. Author ids are
//! resolved through the chat client once per author per collection pass and
//! messages whose author has no usable display name are dropped. The
//! combined list is deduplicated on the exact formatted line, keeping the
//! first occurrence.
//!
//! Chat is an optional signal. Any client failure here is logged, counted
//! on the returned scan, and the collection continues with the channels
//! that did respond; the worst case is an empty list, never an aborted
//! tick.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use vigil_core::chat::ChatClient;

/// Fractional epoch seconds, the timestamp form chat history queries take.
fn epoch_seconds(t: DateTime<Utc>) -> f64 {
    t.timestamp() as f64 + f64::from(t.timestamp_subsec_micros()) / 1_000_000.0
}

/// Result of collecting chat lines for one window.
///
/// `failed_sources` counts the channel listing, each channel whose history
/// fetch failed, and each author whose name lookup failed; the caller folds
/// it into the tick's error counter.
#[derive(Debug, Default)]
pub struct ChatScan {
    pub messages: Vec<String>,
    pub failed_sources: usize,
}

/// Collect deduplicated `name: text` lines across all member channels for
/// the window `[start, end]`.
pub async fn messages_in_window(
    client: &dyn ChatClient,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> ChatScan {
    let mut scan = ChatScan::default();

    let channels = match client.list_member_channels().await {
        Ok(channels) => channels,
        Err(e) => {
            tracing::warn!(backend = client.name(), error = %e, "Chat channel listing failed; skipping chat signal");
            scan.failed_sources += 1;
            return scan;
        }
    };

    let oldest = epoch_seconds(start);
    let latest = epoch_seconds(end);

    let mut display_names: HashMap<String, Option<String>> = HashMap::new();
    let mut seen: HashSet<String> = HashSet::new();

    for channel in &channels {
        let history = match client.channel_history(&channel.id, oldest, latest).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(
                    backend = client.name(),
                    channel = %channel.name,
                    error = %e,
                    "Chat history fetch failed; skipping channel"
                );
                scan.failed_sources += 1;
                continue;
            }
        };

        for message in history {
            let name = match display_names.get(&message.author_id) {
                Some(cached) => cached.clone(),
                None => {
                    let resolved = match client.resolve_display_name(&message.author_id).await {
                        Ok(name) => name,
                        Err(e) => {
                            tracing::warn!(
                                backend = client.name(),
                                author = %message.author_id,
                                error = %e,
                                "Author lookup failed; dropping their messages"
                            );
                            // Memoized below, so one count per author id
                            scan.failed_sources += 1;
                            None
                        }
                    };
                    display_names.insert(message.author_id.clone(), resolved.clone());
                    resolved
                }
            };

            let Some(name) = name else {
                continue;
            };

            let line = format!("{}: {}", name, message.text);
            if seen.insert(line.clone()) {
                scan.messages.push(line);
            }
        }
    }

    scan
}

// ============================================================================
// TESTS
// ============================================================================
