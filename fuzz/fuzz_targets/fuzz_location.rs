// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fuzz target for Location parsing and canonicalization

#![no_main]

use libfuzzer_sys::fuzz_target;
use ufl_core::Location;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(location) = Location::parse(input) else {
        return;
    };

    // Canonical form must parse back to the same location
    let canonical = location.to_canonical_string();
    let reparsed = Location::parse(&canonical).expect("canonical form must parse");
    assert_eq!(reparsed, location);
    assert_eq!(reparsed.to_canonical_string(), canonical);

    let _ = location.parent();
    let _ = location.name();
    let _ = location.extension();
    let _ = location.realm();

    // Resolve the input's own tail against it
    if let Some((_, tail)) = input.rsplit_once('/') {
        if let Ok(resolved) = location.resolve(tail) {
            assert!(Location::parse(&resolved.to_canonical_string()).is_ok());
        }
    }
});
