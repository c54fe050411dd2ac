//! Persistence service boundary
//!
//! The board never talks to the remote store directly. It goes through
//! [`ProspectService`], which the application implements over whatever
//! transport it uses. [`InMemoryProspectService`] is a complete in-process
//! implementation for tests and simulation.

use crate::error::ServiceError;
use crate::types::{Prospect, ProspectFilter, ProspectId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Remote prospect store
#[async_trait]
pub trait ProspectService: Send + Sync {
    /// Fetch prospects for a full board load
    async fn fetch_prospects(&self, filter: &ProspectFilter) -> Result<Vec<Prospect>, ServiceError>;

    /// Set a prospect's status to one of the nine stage titles.
    ///
    /// Returns the updated record as the store now holds it.
    async fn update_prospect_stage(
        &self,
        id: &ProspectId,
        title: &str,
    ) -> Result<Prospect, ServiceError>;
}

/// In-memory prospect store
#[derive(Debug, Default)]
pub struct InMemoryProspectService {
    prospects: RwLock<Vec<Prospect>>,
    failing_updates: AtomicUsize,
    failing_fetches: AtomicUsize,
    update_calls: RwLock<Vec<(ProspectId, String)>>,
}

impl InMemoryProspectService {
    /// Create store holding `prospects`
    #[must_use]
    pub fn new(prospects: Vec<Prospect>) -> Self {
        Self {
            prospects: RwLock::new(prospects),
            ..Self::default()
        }
    }

    /// Make the next `count` stage updates fail with a transport error
    pub fn fail_next_updates(&self, count: usize) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` fetches fail with a transport error
    pub fn fail_next_fetches(&self, count: usize) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    /// Current contents of the store
    #[must_use]
    pub fn prospects(&self) -> Vec<Prospect> {
        self.prospects.read().clone()
    }

    /// Every `update_prospect_stage` call received, including failed ones
    #[must_use]
    pub fn update_calls(&self) -> Vec<(ProspectId, String)> {
        self.update_calls.read().clone()
    }

    /// Add a prospect directly, bypassing the board
    pub fn insert(&self, prospect: Prospect) {
        self.prospects.write().push(prospect);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn matches_filter(prospect: &Prospect, filter: &ProspectFilter) -> bool {
    if let Some(status) = &filter.status {
        if &prospect.status != status {
            return false;
        }
    }
    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        let hit = [&prospect.full_name, &prospect.email, &prospect.phone_number]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle));
        if !hit {
            return false;
        }
    }
    true
}

#[async_trait]
impl ProspectService for InMemoryProspectService {
    async fn fetch_prospects(&self, filter: &ProspectFilter) -> Result<Vec<Prospect>, ServiceError> {
        if Self::take_failure(&self.failing_fetches) {
            return Err(ServiceError::transport("injected fetch failure"));
        }

        Ok(self
            .prospects
            .read()
            .iter()
            .filter(|p| matches_filter(p, filter))
            .cloned()
            .collect())
    }

    async fn update_prospect_stage(
        &self,
        id: &ProspectId,
        title: &str,
    ) -> Result<Prospect, ServiceError> {
        self.update_calls.write().push((id.clone(), title.to_string()));

        if Self::take_failure(&self.failing_updates) {
            return Err(ServiceError::transport("injected update failure"));
        }

        let mut prospects = self.prospects.write();
        let prospect = prospects
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| ServiceError::NotFound(id.clone()))?;
        prospect.status = title.to_string();
        Ok(prospect.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> InMemoryProspectService {
        InMemoryProspectService::new(vec![
            Prospect::new("1", "New Lead")
                .with_name("Ada Lovelace")
                .with_email("ada@example.com"),
            Prospect::new("2", "Lost").with_name("Alan Turing"),
            Prospect::new("3", "New Lead").with_phone("555-0199"),
        ])
    }

    #[tokio::test]
    async fn fetch_unfiltered() {
        let all = service().fetch_prospects(&ProspectFilter::all()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn fetch_by_status_and_search() {
        let svc = service();

        let leads = svc
            .fetch_prospects(&ProspectFilter::all().with_status("New Lead"))
            .await
            .unwrap();
        assert_eq!(leads.len(), 2);

        let ada = svc
            .fetch_prospects(&ProspectFilter::all().with_search("ADA@"))
            .await
            .unwrap();
        assert_eq!(ada.len(), 1);
        assert_eq!(ada[0].id.as_str(), "1");

        let phone = svc
            .fetch_prospects(&ProspectFilter::all().with_status("New Lead").with_search("0199"))
            .await
            .unwrap();
        assert_eq!(phone.len(), 1);
    }

    #[tokio::test]
    async fn update_sets_status() {
        let svc = service();
        let updated = svc
            .update_prospect_stage(&ProspectId::new("2"), "Qualified")
            .await
            .unwrap();
        assert_eq!(updated.status, "Qualified");
        assert_eq!(svc.prospects()[1].status, "Qualified");
        assert_eq!(svc.update_calls(), vec![(ProspectId::new("2"), "Qualified".to_string())]);
    }

    #[tokio::test]
    async fn update_unknown_id() {
        let err = service()
            .update_prospect_stage(&ProspectId::new("404"), "Lost")
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::NotFound(ProspectId::new("404")));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let svc = service();
        svc.fail_next_updates(1);
        svc.fail_next_fetches(1);

        assert!(svc.update_prospect_stage(&ProspectId::new("1"), "Lost").await.is_err());
        assert!(svc.update_prospect_stage(&ProspectId::new("1"), "Lost").await.is_ok());
        assert!(svc.fetch_prospects(&ProspectFilter::all()).await.is_err());
        assert!(svc.fetch_prospects(&ProspectFilter::all()).await.is_ok());
        assert_eq!(svc.update_calls().len(), 2);
    }
}
