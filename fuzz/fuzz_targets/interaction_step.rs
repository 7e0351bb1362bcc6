#![no_main]

use agora_engine::{
    AdditiveLedger, DesignStore, LocusArena, LocusPath, ParticipantRole, Polarity, StepperConfig,
};
use libfuzzer_sys::fuzz_target;

const MAX_ACTS: usize = 48;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let mut store = DesignStore::new();
    let mut arena = LocusArena::new();
    let pos = store.create_design(ParticipantRole::Advocate);
    let neg = store.create_design(ParticipantRole::Challenger);
    let mut choices = AdditiveLedger::new();

    // Interpret the input as a small append/pick program. Appends may be
    // rejected (slot conflicts, orphans); rejections must never panic.
    let mut cursor = data.iter().copied();
    for _ in 0..MAX_ACTS {
        let Some(op) = cursor.next() else { break };
        let locus = locus_from(op, cursor.next().unwrap_or(0));
        match op % 5 {
            0 => {
                let _ = store.append_act(
                    &mut arena,
                    pos,
                    locus,
                    Polarity::Positive,
                    "p",
                    vec!["1".to_string(), "2".to_string()],
                    op & 0x20 != 0,
                );
            }
            1 => {
                let _ = store.append_act(
                    &mut arena,
                    neg,
                    locus,
                    Polarity::Negative,
                    "n",
                    Vec::new(),
                    false,
                );
            }
            2 => {
                let _ = store.append_daimon(&mut arena, neg, locus, "END");
            }
            3 => {
                let _ = store.append_daimon(&mut arena, pos, locus, "END");
            }
            _ => {
                let suffix = if op & 0x10 != 0 { "1" } else { "2" };
                let _ = choices.pick(locus, suffix);
            }
        }
    }

    let cfg = StepperConfig::default();
    let pos_design = store.design(pos).expect("pos design");
    let neg_design = store.design(neg).expect("neg design");

    // Whatever the program built, stepping must not panic, and stepping
    // twice must be byte-identical.
    let first = agora_engine::stepper::step(pos_design, neg_design, &choices, &cfg);
    let second = agora_engine::stepper::step(pos_design, neg_design, &choices, &cfg);
    assert_eq!(first, second);
    if let (Ok(a), Ok(b)) = (&first, &second) {
        assert_eq!(a.content_hash(), b.content_hash());
    }
});

fn locus_from(op: u8, detail: u8) -> LocusPath {
    let root = LocusPath::root();
    match detail % 4 {
        0 => root,
        1 => root.child(&(detail % 3 + 1).to_string()).expect("child"),
        2 => root
            .child(&(detail % 2 + 1).to_string())
            .and_then(|c| c.child("1"))
            .expect("grandchild"),
        _ => root.child(&(op % 3 + 1).to_string()).expect("child"),
    }
}
