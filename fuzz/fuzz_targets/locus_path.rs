#![no_main]

use agora_engine::{LocusArena, LocusPath};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(path) = LocusPath::parse(raw) else {
        return;
    };

    // Accepted paths must survive a parse round-trip unchanged.
    let reparsed = LocusPath::parse(path.as_str()).expect("round-trip parse");
    assert_eq!(reparsed, path);

    // Every ancestor of a valid path is itself valid, and interning the
    // path materializes the full ancestor chain.
    let ancestry = path.ancestry();
    assert_eq!(ancestry.last(), Some(&path));
    for ancestor in &ancestry {
        assert!(ancestor.is_prefix_of(&path));
    }

    let mut arena = LocusArena::new();
    arena.intern(&path);
    for ancestor in &ancestry {
        assert!(arena.contains(ancestor));
    }
});
