mod common;

use std::time::Duration;

use common::Rig;
use ivory_audio::engine::backend::TestOp;

#[test]
fn test_panic_clears_mixed_states() {
    let mut rig = Rig::all_features();

    // Three notes released with the pedal up, still in their release thump
    for note in [70, 72, 74] {
        rig.note_on(note, 60);
        rig.note_off(note);
    }

    // Three notes sustained by the pedal
    rig.pedal_down();
    for note in [48, 50, 52] {
        rig.note_on(note, 90);
        rig.note_off(note);
    }

    // Four notes physically held
    for note in [60, 62, 64, 65] {
        rig.note_on(note, 100);
    }

    assert_eq!(rig.engine.active_notes().len(), 10);
    assert_eq!(rig.engine.active_notes().iter().filter(|n| n.sustained_by_pedal).count(), 3);
    assert!(rig.engine.pending_automations() > 0);
    rig.check_invariants();

    rig.engine.panic();

    assert!(rig.engine.active_notes().is_empty());
    assert_eq!(rig.keys.pressed_count(), 0);
    assert_eq!(rig.engine.pending_automations(), 0);
    assert_eq!(rig.backend.count(|op| matches!(op, TestOp::ReleaseAll)), 1);

    rig.backend.clear();
    rig.advance(Duration::from_secs(30));
    assert!(rig.backend.operations().is_empty());
}

#[test]
fn test_panic_on_idle_engine_still_silences_server() {
    let mut rig = Rig::all_features();
    rig.engine.panic();
    rig.engine.panic();
    assert_eq!(rig.backend.count(|op| matches!(op, TestOp::ReleaseAll)), 2);
    assert!(rig.engine.active_notes().is_empty());
}
