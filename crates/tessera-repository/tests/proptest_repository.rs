//! Property tests for repository cache and store bookkeeping.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use proptest::prelude::*;
use tessera_repository::prelude::*;

#[derive(Debug, Clone)]
enum RepoOp {
    Create(usize),
    Release(usize),
    PutInstance(usize),
    Remove(usize),
    Query(usize),
    Reconnect,
}

fn repo_op_strategy() -> impl Strategy<Value = RepoOp> {
    prop_oneof![
        (0..6usize).prop_map(RepoOp::Create),
        (0..6usize).prop_map(RepoOp::Release),
        (0..6usize).prop_map(RepoOp::PutInstance),
        (0..6usize).prop_map(RepoOp::Remove),
        (0..6usize).prop_map(RepoOp::Query),
        Just(RepoOp::Reconnect),
    ]
}

fn id_of(n: usize) -> EntityId {
    EntityId::new(format!("tex{n}"), "Texture")
}

/// What the repository should know about each name.
#[derive(Default)]
struct Model {
    stored: BTreeSet<usize>,
    cached: BTreeSet<usize>,
    held: HashMap<usize, Arc<Texture>>,
}

impl Model {
    fn alive(&self, n: usize) -> bool {
        self.cached.contains(&n) && self.held.contains_key(&n)
    }

    fn known(&self, n: usize) -> bool {
        self.alive(n) || self.stored.contains(&n)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// `has`, `query` and the stored records follow a simple model through
    /// arbitrary creates, releases, removes and reconnects.
    #[test]
    fn repository_matches_model(ops in prop::collection::vec(repo_op_strategy(), 1..40)) {
        let fs = Arc::new(MemoryFileSystem::new());
        let store = Arc::new(FileStoreMapper::new(&Family::Textures.config(), fs.clone()));
        let repo: Repository<Texture> = Repository::new(store);
        register_texture_factory(repo.factory());
        let mut model = Model::default();

        for op in ops {
            match op {
                RepoOp::Create(n) => {
                    let created = repo.request_creation(&id_of(n), "Texture", PersistenceLevel::Store);
                    prop_assert_eq!(created.is_some(), !model.known(n));
                    if let Some(texture) = created {
                        model.held.insert(n, texture);
                        model.cached.insert(n);
                        model.stored.insert(n);
                    }
                }
                RepoOp::Release(n) => {
                    model.held.remove(&n);
                }
                RepoOp::PutInstance(n) => {
                    let instance = id_of(n).next(&repo);
                    let texture = Arc::new(Texture::ghost(instance.clone()));
                    repo.put(&instance, &texture);
                    prop_assert!(repo.is_cached(&instance));
                    prop_assert!(repo.has(&instance));
                    let found = repo.query(&instance);
                    prop_assert!(found.is_some_and(|t| Arc::ptr_eq(&t, &texture)));
                }
                RepoOp::Remove(n) => {
                    repo.remove(&id_of(n));
                    model.cached.remove(&n);
                    model.stored.remove(&n);
                }
                RepoOp::Query(n) => {
                    let expect_hit = model.alive(n);
                    let found = repo.query(&id_of(n));
                    prop_assert_eq!(found.is_some(), model.known(n));
                    if let Some(texture) = found {
                        if expect_hit {
                            prop_assert!(Arc::ptr_eq(&texture, &model.held[&n]));
                        }
                        model.held.insert(n, texture);
                        model.cached.insert(n);
                    }
                }
                RepoOp::Reconnect => {
                    repo.disconnect();
                    prop_assert!(repo.connect());
                    model.cached.clear();
                }
            }

            for n in 0..6 {
                prop_assert_eq!(repo.has(&id_of(n)), model.known(n));
            }
            let stored: BTreeSet<usize> = repo
                .store()
                .records()
                .unwrap()
                .into_iter()
                .filter_map(|(id, _)| id.name().strip_prefix("tex")?.parse().ok())
                .collect();
            prop_assert_eq!(&stored, &model.stored);
        }
    }
}
