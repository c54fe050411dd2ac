//! Testing utilities for the pipeline board workspace
//!
//! Shared fixtures, a `mockall` mock of the persistence service, and a gated
//! service whose stage updates settle only when the test says so.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use mockall::mock;
use pipeline_board::{
    Board, BoardStore, Prospect, ProspectFilter, ProspectId, ProspectService, ServiceError,
    StageKey,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

mock! {
    pub ProspectService {}

    #[async_trait]
    impl pipeline_board::ProspectService for ProspectService {
        async fn fetch_prospects(&self, filter: &ProspectFilter) -> Result<Vec<Prospect>, ServiceError>;

        async fn update_prospect_stage(
            &self,
            id: &ProspectId,
            title: &str,
        ) -> Result<Prospect, ServiceError>;
    }
}

pub fn prospect(id: &str, status: &str) -> Prospect {
    Prospect::new(id, status)
}

/// Prospect created on day `day` of January 2024
pub fn dated_prospect(id: &str, status: &str, day: u32) -> Prospect {
    Prospect::new(id, status).with_created_at(Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap())
}

/// One prospect per stage title, plus one with an unknown label
pub fn sample_prospects() -> Vec<Prospect> {
    let mut prospects: Vec<Prospect> = StageKey::ALL
        .iter()
        .enumerate()
        .map(|(i, key)| {
            prospect(&format!("p{i}"), key.title())
                .with_name(format!("Prospect {i}"))
                .with_email(format!("p{i}@example.com"))
        })
        .collect();
    prospects.push(prospect("unknown", "Archived"));
    prospects
}

/// Store already holding a board built from `prospects`
pub fn store_with(prospects: Vec<Prospect>) -> Arc<BoardStore> {
    let store = Arc::new(BoardStore::new());
    store.publish(Board::build(prospects)).unwrap();
    store
}

/// Ids of one bucket, in order
pub fn bucket_ids(board: &Board, key: StageKey) -> Vec<String> {
    board.bucket(key).iter().map(|p| p.id.to_string()).collect()
}

/// Panics unless every input prospect appears on the board exactly once
pub fn assert_partition(board: &Board, input: &[Prospect]) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for (_, bucket) in board.iter() {
        for p in bucket.iter() {
            *seen.entry(p.id.as_str()).or_default() += 1;
        }
    }

    assert_eq!(board.len(), input.len(), "board size differs from input");
    for p in input {
        assert_eq!(
            seen.get(p.id.as_str()).copied(),
            Some(1),
            "prospect {} should appear exactly once",
            p.id
        );
    }
}

/// A stage update waiting for the test to settle it
#[derive(Debug)]
pub struct PendingUpdate {
    pub id: ProspectId,
    pub title: String,
    reply: oneshot::Sender<Result<(), ServiceError>>,
}

impl PendingUpdate {
    pub fn succeed(self) {
        let _ = self.reply.send(Ok(()));
    }

    pub fn fail(self, message: &str) {
        let _ = self.reply.send(Err(ServiceError::transport(message)));
    }
}

/// Receiving end of a [`GatedProspectService`]
#[derive(Debug)]
pub struct UpdateQueue {
    rx: mpsc::UnboundedReceiver<PendingUpdate>,
}

impl UpdateQueue {
    /// Wait for the next stage update call
    pub async fn next(&mut self) -> PendingUpdate {
        self.rx.recv().await.expect("gated service dropped")
    }

    /// Next stage update call, if one was already made
    pub fn try_next(&mut self) -> Option<PendingUpdate> {
        self.rx.try_recv().ok()
    }
}

/// Service whose stage updates block until settled through an [`UpdateQueue`]
#[derive(Debug)]
pub struct GatedProspectService {
    prospects: Vec<Prospect>,
    tx: mpsc::UnboundedSender<PendingUpdate>,
}

impl GatedProspectService {
    pub fn new(prospects: Vec<Prospect>) -> (Self, UpdateQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { prospects, tx }, UpdateQueue { rx })
    }
}

#[async_trait]
impl ProspectService for GatedProspectService {
    async fn fetch_prospects(&self, _filter: &ProspectFilter) -> Result<Vec<Prospect>, ServiceError> {
        Ok(self.prospects.clone())
    }

    async fn update_prospect_stage(
        &self,
        id: &ProspectId,
        title: &str,
    ) -> Result<Prospect, ServiceError> {
        let (reply, settled) = oneshot::channel();
        self.tx
            .send(PendingUpdate {
                id: id.clone(),
                title: title.to_string(),
                reply,
            })
            .map_err(|_| ServiceError::transport("update queue closed"))?;

        match settled.await {
            Ok(Ok(())) => Ok(Prospect::new(id.clone(), title)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ServiceError::transport("update abandoned")),
        }
    }
}
