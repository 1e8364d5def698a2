//! Property tests for the mapper-file codec and the in-memory store.

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use tessera_core::prelude::*;
use tessera_store::prelude::*;

fn layout_strategy() -> impl Strategy<Value = IndexLayout> {
    prop_oneof![
        Just(IndexLayout::Sequenced),
        Just(IndexLayout::Asset),
        Just(IndexLayout::Typed),
    ]
}

#[derive(Debug, Clone)]
enum StoreOp {
    Put(usize),
    Remove(usize),
    Reconnect,
}

fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        (0..8usize).prop_map(StoreOp::Put),
        (0..8usize).prop_map(StoreOp::Remove),
        Just(StoreOp::Reconnect),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1_000))]

    /// Arbitrary bytes in a mapper file never panic the parser, and whatever
    /// survives parsing renders and re-parses to the same index.
    #[test]
    fn parsing_arbitrary_text_is_stable(
        layout in layout_strategy(),
        text in "[a-z0-9,\\n\\r@. ]{0,200}",
    ) {
        let tag = TypeTag::new("Texture");
        let index = layout.parse(&text, &tag);
        let rendered = layout.render(&index);
        let mut reparsed = layout.parse(&rendered, &tag);
        if !layout.carries_sequence() {
            reparsed.sequence = index.sequence;
        }
        prop_assert_eq!(reparsed, index);
    }

    /// The store's visible records always match a plain map model, across
    /// disconnects.
    #[test]
    fn store_matches_model(ops in prop::collection::vec(store_op_strategy(), 1..40)) {
        let fs = Arc::new(MemoryFileSystem::new());
        let mapper = FileStoreMapper::new(&Family::Textures.config(), fs);
        let mut model: BTreeMap<EntityId, String> = BTreeMap::new();

        for op in ops {
            match op {
                StoreOp::Put(i) => {
                    let name = format!("tex{i}");
                    let id = EntityId::new(name.as_str(), "Texture");
                    let mut doc = GenericDocument::new();
                    doc.add_name(name.as_str());
                    mapper.put(&id, &doc).unwrap();
                    model.insert(id, format!("{name}.json"));
                }
                StoreOp::Remove(i) => {
                    let id = EntityId::new(format!("tex{i}"), "Texture");
                    mapper.remove(&id).unwrap();
                    model.remove(&id);
                }
                StoreOp::Reconnect => {
                    mapper.disconnect();
                    mapper.connect().unwrap();
                }
            }
            let expected: Vec<(EntityId, String)> = model.clone().into_iter().collect();
            prop_assert_eq!(mapper.records().unwrap(), expected);
        }
    }
}
