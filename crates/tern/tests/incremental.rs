//! Incremental session behavior: merge, fallback, and source retention.

use tern::{Bag, EditWindow, IncrementalSession, ReparseMode};

const V1: &str = "fn a() -> i32 { return 1; }\nfn b() -> i32 { return 2; }\n";

#[test]
fn initialize_produces_a_full_snapshot() {
    let mut session = IncrementalSession::new();
    let mut bag = Bag::new();
    assert!(session.initialize(V1, 0, &mut bag));
    assert!(session.ready());
    assert_eq!(session.last_mode(), ReparseMode::FullRebuild);

    let snap = session.snapshot().expect("snapshot");
    assert_eq!(snap.top_items.len(), 2);
    assert_eq!(snap.revision, 1);
    assert_eq!(session.source_owner_count(), 1);
}

#[test]
fn editing_a_later_item_merges_incrementally() {
    let mut session = IncrementalSession::new();
    let mut bag = Bag::new();
    session.initialize(V1, 0, &mut bag);
    let first_item_before = session.snapshot().unwrap().top_items[0].sid;

    // change the body of `b`
    let v2 = V1.replace("return 2;", "return 3;");
    let edit_at = u32::try_from(v2.find("return 3;").unwrap()).unwrap();
    let edits = [EditWindow {
        lo: edit_at,
        hi: edit_at + 9,
    }];
    assert!(session.reparse_with_edits(&v2, 0, &edits, &mut bag));
    assert_eq!(session.last_mode(), ReparseMode::IncrementalMerge);

    let snap = session.snapshot().unwrap();
    assert_eq!(snap.top_items.len(), 2);
    assert_eq!(snap.revision, 2);
    // item 0 keeps its stable id from the previous snapshot
    assert_eq!(snap.top_items[0].sid, first_item_before);
    // the old buffer stays retained for the preserved item's spans
    assert_eq!(session.source_owner_count(), 2);
}

#[test]
fn editing_the_first_item_falls_back_to_full_rebuild() {
    let mut session = IncrementalSession::new();
    let mut bag = Bag::new();
    session.initialize(V1, 0, &mut bag);

    let v2 = V1.replace("return 1;", "return 9;");
    let edits = [EditWindow { lo: 0, hi: 4 }];
    assert!(session.reparse_with_edits(&v2, 0, &edits, &mut bag));
    assert_eq!(session.last_mode(), ReparseMode::FallbackFullRebuild);
    // a full rebuild compacts the retained buffers
    assert_eq!(session.source_owner_count(), 1);
}

#[test]
fn empty_edit_list_rebuilds_fully() {
    let mut session = IncrementalSession::new();
    let mut bag = Bag::new();
    session.initialize(V1, 0, &mut bag);
    assert!(session.reparse_with_edits(V1, 0, &[], &mut bag));
    assert_eq!(session.last_mode(), ReparseMode::FullRebuild);
}

#[test]
fn repeated_merges_eventually_compact() {
    let mut session = IncrementalSession::new();
    let mut bag = Bag::new();
    session.initialize(V1, 0, &mut bag);

    // each merge appends a retained buffer; past the threshold the session
    // must fall back and compact
    let mut current = V1.to_owned();
    let mut saw_fallback = false;
    for n in 0..40 {
        let next = current.replace("return", "return ").replace("return  ", "return ");
        let _ = next;
        let body = format!("fn b() -> i32 {{ return {n}; }}\n");
        let updated = format!("fn a() -> i32 {{ return 1; }}\n{body}");
        let at = u32::try_from(updated.find("fn b").unwrap()).unwrap();
        session.reparse_with_edits(
            &updated,
            0,
            &[EditWindow { lo: at, hi: at + 4 }],
            &mut bag,
        );
        if session.last_mode() == ReparseMode::FallbackFullRebuild {
            saw_fallback = true;
            break;
        }
        assert!(session.source_owner_count() <= 17);
        current = updated;
    }
    assert!(saw_fallback, "retention threshold must trigger a compacting rebuild");
}

#[test]
fn merge_reports_new_diagnostics_from_the_edited_tail() {
    let mut session = IncrementalSession::new();
    let mut bag = Bag::new();
    session.initialize(V1, 0, &mut bag);
    assert!(!bag.has_error());

    // introduce a parse error in `b` only
    let v2 = V1.replace("return 2;", "return ;@");
    let at = u32::try_from(v2.find("return ;@").unwrap()).unwrap();
    session.reparse_with_edits(
        &v2,
        0,
        &[EditWindow { lo: at, hi: at + 9 }],
        &mut bag,
    );
    assert!(bag.has_error(), "tail errors must surface through the session");
}
