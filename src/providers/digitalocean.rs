//! DigitalOcean v2 adapter: droplet snapshots and droplet actions

use super::{
    decode_body, parse_timestamp, ActionHandle, ActionStatus, FlexibleId, Provider, ServerTarget, Snapshot,
    SnapshotProvider,
};
use crate::api::{ApiClient, ApiError};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

pub const API_BASE: &str = "https://api.digitalocean.com/v2";

const PAGE_SIZE: usize = 200;
const MAX_PAGES: u32 = 100;

#[derive(Deserialize)]
struct SnapshotPage {
    snapshots: Vec<DropletSnapshot>,
    #[serde(default)]
    links: Option<Links>,
}

#[derive(Deserialize)]
struct DropletSnapshot {
    id: FlexibleId,
    name: String,
    created_at: String,
    #[serde(default)]
    resource_id: Option<FlexibleId>,
}

#[derive(Deserialize, Default)]
struct Links {
    #[serde(default)]
    pages: Option<Pages>,
}

#[derive(Deserialize, Default)]
struct Pages {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Deserialize)]
struct ActionEnvelope {
    action: Action,
}

#[derive(Deserialize)]
struct Action {
    id: FlexibleId,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    id: Option<String>,
    message: String,
}

/// Extract `{"id": ..., "message": ...}` error bodies
pub fn decode_error(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    Some(match parsed.id {
        Some(id) => format!("{}: {}", id, parsed.message),
        None => parsed.message,
    })
}

/// Adapter for one droplet
pub struct DigitalOceanProvider {
    client: ApiClient,
    droplet: ServerTarget,
}

impl DigitalOceanProvider {
    pub fn new(client: ApiClient, droplet: ServerTarget) -> Self {
        Self {
            client: client.with_error_decoder(decode_error),
            droplet,
        }
    }

    fn belongs_to_droplet(&self, snapshot: &DropletSnapshot) -> bool {
        let by_resource = snapshot
            .resource_id
            .as_ref()
            .map(|id| id.to_string() == self.droplet.id)
            .unwrap_or(false);
        by_resource || snapshot.name.starts_with(&self.droplet.snapshot_prefix())
    }
}

impl SnapshotProvider for DigitalOceanProvider {
    fn provider(&self) -> Provider {
        Provider::DigitalOcean
    }

    fn list_snapshots(&self) -> Result<Vec<Snapshot>, ApiError> {
        let mut snapshots = Vec::new();

        for page in 1..=MAX_PAGES {
            let body = self.client.get_json(
                "/snapshots",
                &[
                    ("resource_type", "droplet".to_string()),
                    ("per_page", PAGE_SIZE.to_string()),
                    ("page", page.to_string()),
                ],
            )?;
            let page_data: SnapshotPage = decode_body(body, "snapshot list")?;
            let count = page_data.snapshots.len();

            for item in page_data.snapshots.iter().filter(|s| self.belongs_to_droplet(s)) {
                match parse_timestamp(&item.created_at) {
                    Some(created_at) => snapshots.push(Snapshot {
                        id: item.id.to_string(),
                        name: item.name.clone(),
                        created_at,
                        provider: Provider::DigitalOcean,
                    }),
                    None => warn!(
                        "Ignoring snapshot {} with invalid created_at '{}'",
                        item.name, item.created_at
                    ),
                }
            }

            let has_next = page_data
                .links
                .and_then(|l| l.pages)
                .and_then(|p| p.next)
                .is_some();
            debug!("Snapshot page {}: {} item(s), more pages: {}", page, count, has_next);

            if count < PAGE_SIZE || !has_next {
                break;
            }
        }

        info!("Found {} snapshot(s) for droplet {}", snapshots.len(), self.droplet.name);
        Ok(snapshots)
    }

    fn create_snapshot(&self, name: &str) -> Result<ActionHandle, ApiError> {
        let body = self.client.post_json(
            &format!("/droplets/{}/actions", self.droplet.id),
            json!({ "type": "snapshot", "name": name }),
        )?;
        let envelope: ActionEnvelope = decode_body(body, "droplet action")?;

        info!("Snapshot action {} started for droplet {}", envelope.action.id, self.droplet.name);
        Ok(ActionHandle {
            action_id: envelope.action.id.to_string(),
            provider: Provider::DigitalOcean,
            snapshot_id: None,
        })
    }

    fn poll_action(&self, handle: &ActionHandle) -> Result<ActionStatus, ApiError> {
        let body = self
            .client
            .get_json(&format!("/actions/{}", handle.action_id), &[])?;
        let envelope: ActionEnvelope = decode_body(body, "action status")?;

        Ok(match envelope.action.status.as_deref() {
            Some("completed") => ActionStatus::Done,
            Some("errored") => ActionStatus::Errored,
            _ => ActionStatus::Pending,
        })
    }

    fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), ApiError> {
        match self.client.delete(&format!("/snapshots/{}", snapshot_id)) {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("Snapshot {} already deleted", snapshot_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
