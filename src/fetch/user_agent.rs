use rand::Rng;

/// User agent sent on the first attempt of every request
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Pool drawn from on retries
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/115.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36 Edg/121.0.0.0",
];

/// Picks the user agent for a zero-based attempt number
///
/// Attempt 0 always uses [`DEFAULT_USER_AGENT`]; retries draw uniformly
/// from [`USER_AGENTS`].
pub fn select_user_agent<R: Rng + ?Sized>(attempt: u32, rng: &mut R) -> &'static str {
    if attempt == 0 {
        return DEFAULT_USER_AGENT;
    }
    USER_AGENTS[rng.random_range(0..USER_AGENTS.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_first_attempt_is_canonical() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            assert_eq!(select_user_agent(0, &mut rng), DEFAULT_USER_AGENT);
        }
    }

    #[test]
    fn test_retries_draw_from_pool() {
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 1..50 {
            assert!(USER_AGENTS.contains(&select_user_agent(attempt, &mut rng)));
        }
    }
}
