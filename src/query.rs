//! Read-side operations used by the command surface

use crate::error::Result;
use crate::resolution::Status;
use crate::store::{Episode, EpisodeStore, StoreStats};

/// Episodes still pending review, oldest first
pub fn list_unresolved(store: &EpisodeStore) -> Result<Vec<Episode>> {
    store.list(Some(Status::Unresolved))
}

pub fn list(store: &EpisodeStore, status: Option<Status>) -> Result<Vec<Episode>> {
    store.list(status)
}

pub fn get(store: &EpisodeStore, session_id: &str) -> Result<Episode> {
    store.get(session_id)
}

/// Other sessions archived with the same content as `episode`
pub fn duplicates_of(store: &EpisodeStore, episode: &Episode) -> Result<Vec<Episode>> {
    let mut matches = store.find_by_fingerprint(&episode.fingerprint)?;
    matches.retain(|e| e.session_id != episode.session_id);
    Ok(matches)
}

pub fn stats(store: &EpisodeStore) -> Result<StoreStats> {
    store.stats()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{Role, Transcript, Turn};
    use tempfile::TempDir;

    fn transcript(text: &str) -> Transcript {
        Transcript::from_turns(vec![Turn::new(Role::User, text)]).unwrap()
    }

    #[test]
    fn test_list_unresolved_excludes_resolved() {
        let dir = TempDir::new().unwrap();
        let store = EpisodeStore::open(&dir.path().join("q.db")).unwrap();
        store.create("a", &transcript("one")).unwrap();
        store.create("b", &transcript("two")).unwrap();
        store.create("c", &transcript("three")).unwrap();
        store.transition("b", Status::Resolved).unwrap();

        let ids: Vec<_> = list_unresolved(&store)
            .unwrap()
            .into_iter()
            .map(|e| e.session_id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);

        let resolved = list(&store, Some(Status::Resolved)).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(list(&store, None).unwrap().len(), 3);
    }

    #[test]
    fn test_duplicates_of_excludes_self() {
        let dir = TempDir::new().unwrap();
        let store = EpisodeStore::open(&dir.path().join("q.db")).unwrap();
        store.create("a", &transcript("same")).unwrap();
        store.create("b", &transcript("same")).unwrap();
        store.create("c", &transcript("other")).unwrap();

        let a = get(&store, "a").unwrap();
        let dups = duplicates_of(&store, &a).unwrap();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].session_id, "b");

        let c = get(&store, "c").unwrap();
        assert!(duplicates_of(&store, &c).unwrap().is_empty());
    }

    #[test]
    fn test_empty_listing_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let store = EpisodeStore::open(&dir.path().join("q.db")).unwrap();
        assert!(list_unresolved(&store).unwrap().is_empty());
    }
}
