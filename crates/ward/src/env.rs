//! Environment toggles consulted by a resource's own factory closure, not by the
//! registry itself — the registry stores whatever `ProtectedResource` its caller builds,
//! so disabling a breaker kind is a decision made at construction time, not a property of
//! the identifier it's registered under.

fn flag_set(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// `WARD_CIRCUIT_BREAKER_DISABLED` — when set, a factory should build with
/// [`crate::resource::BreakerStrategy::None`] instead of `Classic`, e.g. to rule out the
/// breaker while diagnosing whether a dependency's failures are circuit-related.
pub fn circuit_breaker_disabled() -> bool {
    flag_set("WARD_CIRCUIT_BREAKER_DISABLED")
}

/// `WARD_ADAPTIVE_CIRCUIT_BREAKER_DISABLED` — same idea for the PID-driven adaptive
/// breaker.
pub fn adaptive_circuit_breaker_disabled() -> bool {
    flag_set("WARD_ADAPTIVE_CIRCUIT_BREAKER_DISABLED")
}

/// `WARD_SKIP_FLAKY_TESTS` — read by this crate's own timing-sensitive tests, exposed here
/// so downstream crates can honor the same convention for tests that share the concern.
pub fn skip_flaky_tests() -> bool {
    flag_set("WARD_SKIP_FLAKY_TESTS")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variables_default_to_false() {
        unsafe { std::env::remove_var("WARD_CIRCUIT_BREAKER_DISABLED") };
        assert!(!circuit_breaker_disabled());
    }

    #[test]
    fn recognizes_one_and_true() {
        unsafe { std::env::set_var("WARD_ADAPTIVE_CIRCUIT_BREAKER_DISABLED", "true") };
        assert!(adaptive_circuit_breaker_disabled());
        unsafe { std::env::set_var("WARD_ADAPTIVE_CIRCUIT_BREAKER_DISABLED", "1") };
        assert!(adaptive_circuit_breaker_disabled());
        unsafe { std::env::remove_var("WARD_ADAPTIVE_CIRCUIT_BREAKER_DISABLED") };
    }
}
