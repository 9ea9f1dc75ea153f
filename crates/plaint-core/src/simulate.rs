//! Demo complaint generator
//!
//! Builds plausible complaints from a profile's problem phrases so the
//! service can be tried without real data. Pass a seeded RNG for
//! reproducible output.

use chrono::{Duration, NaiveDateTime};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::models::NewComplaint;
use crate::profile::Profile;

/// Largest batch a single request may generate
pub const MAX_SIMULATED: usize = 1000;

/// Generated complaints go back at most this far
const MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;

/// Share of generated complaints that carry a reply
const REPLY_PROBABILITY: f64 = 0.7;

/// Used when a profile lists no problem phrases
const DEFAULT_PROBLEM: &str = "有问题";

/// Generate `count` complaints for `profile` dated up to 30 days before `now`
pub fn generate<R: Rng>(
    profile: &Profile,
    count: usize,
    now: NaiveDateTime,
    rng: &mut R,
) -> Vec<NewComplaint> {
    (0..count).map(|_| generate_one(profile, now, rng)).collect()
}

/// Generate with a fixed seed, or from entropy when `seed` is None
pub fn generate_seeded(
    profile: &Profile,
    count: usize,
    now: NaiveDateTime,
    seed: Option<u64>,
) -> Vec<NewComplaint> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    generate(profile, count, now, &mut rng)
}

fn generate_one<R: Rng>(profile: &Profile, now: NaiveDateTime, rng: &mut R) -> NewComplaint {
    // Categories and the fallback are equally likely
    let pick = rng.gen_range(0..=profile.categories.len());
    let (category, content) = match profile.categories.get(pick) {
        Some(def) => {
            let problem = choose_or_default(&def.problems, rng);
            (def.name.clone(), format!("我的{}{}", def.name, problem))
        }
        None => {
            let problem = choose_or_default(&profile.fallback.problems, rng);
            (profile.fallback.name.clone(), problem.to_string())
        }
    };

    let reply = if rng.gen_bool(REPLY_PROBABILITY) {
        profile.simulation.replies.choose(rng).cloned()
    } else {
        None
    };

    NewComplaint {
        complaint_time: now - Duration::seconds(rng.gen_range(0..=MAX_AGE_SECS)),
        content,
        user_id: format!("user_{}", rng.gen_range(1..=100)),
        complaint_category: Some(category),
        reply,
    }
}

fn choose_or_default<'a, R: Rng>(phrases: &'a [String], rng: &mut R) -> &'a str {
    phrases
        .choose(rng)
        .map(String::as_str)
        .unwrap_or(DEFAULT_PROBLEM)
}
