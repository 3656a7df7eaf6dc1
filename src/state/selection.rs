use std::{sync::Arc, time::Duration};

use uuid::Uuid;

use crate::dao::{
    kv::{EphemeralKv, KvResult},
    models::UserId,
};

/// Commands that mutate a winner selection set.
///
/// A closed set instead of sentinel user ids: the bot layer maps its button
/// payloads onto these three shapes and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionCommand {
    /// Flip one candidate in or out of the set.
    Toggle(UserId),
    /// Put every candidate into the set.
    All,
    /// Empty the set.
    Clear,
}

/// One page of a candidate listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items visible on this page.
    pub items: Vec<T>,
    /// 1-based page number after clamping.
    pub page: usize,
    /// Total page count, at least 1.
    pub page_count: usize,
}

/// Window `items` down to one page.
///
/// Page numbers are 1-based and clamped into range, so "previous" on the
/// first page and "next" on the last simply re-render the same page. An
/// empty list yields a single empty page.
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let page_count = items.len().div_ceil(page_size).max(1);
    let page = page.clamp(1, page_count);
    let start = (page - 1) * page_size;
    let end = (start + page_size).min(items.len());

    Page {
        items: items[start..end].to_vec(),
        page,
        page_count,
    }
}

/// Ephemeral winner picks, one panel per `(owner, game)` pair.
///
/// Each panel is a KV hash whose fields are candidate user ids. Rendering
/// (buttons, check marks) lives in the bot layer; this type owns only the
/// set arithmetic and the panel's TTL.
#[derive(Clone)]
pub struct SelectionPanel {
    kv: Arc<dyn EphemeralKv>,
    ttl: Duration,
}

impl SelectionPanel {
    /// Create a panel store over the given backend.
    pub fn new(kv: Arc<dyn EphemeralKv>, ttl: Duration) -> Self {
        SelectionPanel { kv, ttl }
    }

    fn key(owner: UserId, game_id: Uuid) -> String {
        format!("selection:{owner}:{game_id}")
    }

    /// Apply one command and return the resulting set in ascending order.
    ///
    /// Every mutation restarts the panel's TTL. Candidate membership is the
    /// caller's concern; the panel stores whatever ids it is handed.
    pub async fn apply(
        &self,
        owner: UserId,
        game_id: Uuid,
        command: SelectionCommand,
        candidates: &[UserId],
    ) -> KvResult<Vec<UserId>> {
        let key = Self::key(owner, game_id);
        match command {
            SelectionCommand::Toggle(user_id) => {
                let field = user_id.to_string();
                let present = self.kv.get_field(key.clone(), field.clone()).await?;
                if present.is_some() {
                    self.kv.remove_field(key.clone(), field).await?;
                } else {
                    self.kv.put_field(key.clone(), field, "1".into()).await?;
                }
            }
            SelectionCommand::All => {
                for candidate in candidates {
                    self.kv
                        .put_field(key.clone(), candidate.to_string(), "1".into())
                        .await?;
                }
            }
            SelectionCommand::Clear => {
                self.kv.delete(key.clone()).await?;
            }
        }
        self.kv.refresh_ttl(key, self.ttl).await?;

        self.selected(owner, game_id).await
    }

    /// Current set in ascending order; empty when nothing is picked.
    pub async fn selected(&self, owner: UserId, game_id: Uuid) -> KvResult<Vec<UserId>> {
        let fields = self.kv.get_all(Self::key(owner, game_id)).await?;
        let mut picked: Vec<UserId> =
            fields.keys().filter_map(|field| field.parse().ok()).collect();
        picked.sort_unstable();
        Ok(picked)
    }

    /// Drop the panel state entirely, as done when its game ends.
    pub async fn discard(&self, owner: UserId, game_id: Uuid) -> KvResult<()> {
        self.kv.delete(Self::key(owner, game_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::kv::InMemoryKv;

    fn panel() -> SelectionPanel {
        SelectionPanel::new(Arc::new(InMemoryKv::new()), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn toggle_flips_membership() {
        let panel = panel();
        let game_id = Uuid::new_v4();
        let candidates = [20, 10, 30];

        let picked = panel
            .apply(1, game_id, SelectionCommand::Toggle(20), &candidates)
            .await
            .unwrap();
        assert_eq!(picked, vec![20]);

        let picked = panel
            .apply(1, game_id, SelectionCommand::Toggle(10), &candidates)
            .await
            .unwrap();
        assert_eq!(picked, vec![10, 20]);

        let picked = panel
            .apply(1, game_id, SelectionCommand::Toggle(20), &candidates)
            .await
            .unwrap();
        assert_eq!(picked, vec![10]);
    }

    #[tokio::test]
    async fn all_then_clear_round_trips() {
        let panel = panel();
        let game_id = Uuid::new_v4();
        let candidates = [3, 1, 2];

        let picked = panel
            .apply(9, game_id, SelectionCommand::All, &candidates)
            .await
            .unwrap();
        assert_eq!(picked, vec![1, 2, 3]);

        let picked = panel
            .apply(9, game_id, SelectionCommand::Clear, &candidates)
            .await
            .unwrap();
        assert!(picked.is_empty());
    }

    #[tokio::test]
    async fn panels_are_scoped_per_owner_and_game() {
        let panel = panel();
        let game_a = Uuid::new_v4();
        let game_b = Uuid::new_v4();

        panel
            .apply(1, game_a, SelectionCommand::Toggle(5), &[5])
            .await
            .unwrap();

        assert!(panel.selected(1, game_b).await.unwrap().is_empty());
        assert!(panel.selected(2, game_a).await.unwrap().is_empty());
        assert_eq!(panel.selected(1, game_a).await.unwrap(), vec![5]);
    }

    #[test]
    fn pages_clamp_into_range() {
        let items: Vec<i64> = (1..=10).collect();

        let first = paginate(&items, 0, 4);
        assert_eq!(first.page, 1);
        assert_eq!(first.items, vec![1, 2, 3, 4]);
        assert_eq!(first.page_count, 3);

        let last = paginate(&items, 99, 4);
        assert_eq!(last.page, 3);
        assert_eq!(last.items, vec![9, 10]);

        let exact = paginate(&items, 2, 5);
        assert_eq!(exact.items, vec![6, 7, 8, 9, 10]);
    }

    #[test]
    fn empty_lists_still_produce_one_page() {
        let page = paginate::<i64>(&[], 3, 4);
        assert!(page.items.is_empty());
        assert_eq!(page.page, 1);
        assert_eq!(page.page_count, 1);
    }
}
