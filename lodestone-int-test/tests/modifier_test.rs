use lodestone::collection::{upsert, FindOptions, UpdateOptions};
use lodestone::errors::ErrorKind;
use lodestone::modifier::{modify, ModifyOptions};
use lodestone::{doc, val};
use lodestone_int_test::test_util::{cleanup, create_test_context, run_test};

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_push_each_with_negative_slice() {
    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.collection();
            collection.insert(doc! { _id: 1, a: [true] })?;
            collection.update(
                &val!(1),
                &doc! { "$push": { a: { "$each": [1, 2, 3], "$slice": (-2) } } },
                &UpdateOptions::default(),
            )?;
            let doc = collection.find_one(&val!(1), FindOptions::new())?;
            assert_eq!(doc, Some(doc! { _id: 1, a: [2, 3] }));
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_push_at_position() {
    let mut doc = doc! { a: [1, 4] };
    modify(
        &mut doc,
        &doc! { "$push": { a: { "$each": [2, 3], "$position": 1 } } },
        &ModifyOptions::default(),
    )
    .unwrap();
    assert_eq!(doc, doc! { a: [1, 2, 3, 4] });
}

#[test]
fn test_failed_modifier_leaves_document_untouched() {
    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.collection();
            collection.insert(doc! { _id: 1, a: 1, b: "text" })?;
            let err = collection
                .update(
                    &val!(1),
                    &doc! { "$set": { a: 2 }, "$inc": { b: 1 } },
                    &UpdateOptions::default(),
                )
                .unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::ModifierError);
            let doc = collection.find_one(&val!(1), FindOptions::new())?;
            assert_eq!(doc, Some(doc! { _id: 1, a: 1, b: "text" }));
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_upsert_builds_document_from_selector() {
    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.collection();
            let result = collection.update(
                &val!(doc! { name: "ann", "stats.level": 3 }),
                &doc! { "$inc": { score: 10 } },
                &upsert(),
            )?;
            assert_eq!(result.number_affected, 1);
            let id = result.inserted_id.unwrap();

            let doc = collection.find_one(&id, FindOptions::new())?.unwrap();
            let mut expected = doc! { name: "ann", stats: { level: 3 }, score: 10 };
            expected.put_first("_id", id.clone());
            assert_eq!(doc, expected);

            let again = collection.upsert(&val!(doc! { name: "ann" }), &doc! { "$inc": { score: 1 } })?;
            assert_eq!(again.number_affected, 1);
            assert_eq!(again.inserted_id, None);
            assert_eq!(collection.size(), 1);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_upsert_uses_supplied_inserted_id() {
    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.collection();
            let result = collection.update(
                &val!(doc! { kind: "config" }),
                &doc! { "$set": { enabled: true } },
                &UpdateOptions::new(false, true).inserted_id("settings"),
            )?;
            assert_eq!(result.inserted_id, Some(val!("settings")));
            let doc = collection.find_one(&val!("settings"), FindOptions::new())?;
            assert_eq!(doc, Some(doc! { _id: "settings", kind: "config", enabled: true }));
            Ok(())
        },
        cleanup,
    );
}
