use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::dto::draft_dto::CompletedDraft;

/**
 * Passes finished drafts on to match creation. With no webhook configured the
 * hand-off is only logged.
 */
pub async fn run(client: Client, webhook_url: Option<String>, mut rx: mpsc::UnboundedReceiver<CompletedDraft>) {
    while let Some(draft) = rx.recv().await {
        let Some(url) = webhook_url.as_deref() else {
            info!("Draft for lobby {} finished with {} picks", draft.lobby_id, draft.picks.len());
            continue;
        };

        let result = client
            .post(url)
            .json(&draft)
            .send()
            .await
            .and_then(|res| res.error_for_status());

        match result {
            Ok(_) => info!("Handed lobby {} draft to match creation", draft.lobby_id),
            Err(e) => warn!("Match hand-off for lobby {} failed: {}", draft.lobby_id, e),
        }
    }
}
