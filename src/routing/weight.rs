//! Weighted route groups.

use std::collections::{BTreeMap, HashMap};

use rand::Rng;

/// Routes sharing a weight group, with their relative weights.
#[derive(Debug, Clone, Default)]
pub struct WeightGroups {
    groups: BTreeMap<String, Vec<(String, u32)>>,
}

impl WeightGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, group: impl Into<String>, route_id: impl Into<String>, weight: u32) {
        self.groups
            .entry(group.into())
            .or_default()
            .push((route_id.into(), weight));
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Pick one route per group, with probability proportional to weight.
    pub fn draw(&self) -> HashMap<String, String> {
        self.draw_with(&mut rand::thread_rng())
    }

    pub fn draw_with<R: Rng + ?Sized>(&self, rng: &mut R) -> HashMap<String, String> {
        let mut chosen = HashMap::with_capacity(self.groups.len());
        for (group, members) in &self.groups {
            let total: u64 = members.iter().map(|(_, w)| u64::from(*w)).sum();
            if total == 0 {
                continue;
            }
            let mut point = rng.gen_range(0..total);
            for (route_id, weight) in members {
                let weight = u64::from(*weight);
                if point < weight {
                    chosen.insert(group.clone(), route_id.clone());
                    break;
                }
                point -= weight;
            }
        }
        chosen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_draw_is_proportional() {
        let mut groups = WeightGroups::new();
        groups.add("g", "heavy", 8);
        groups.add("g", "light", 2);

        let mut rng = StdRng::seed_from_u64(7);
        let heavy = (0..10_000)
            .filter(|_| groups.draw_with(&mut rng)["g"] == "heavy")
            .count();
        assert!((7_500..8_500).contains(&heavy), "heavy drawn {} times", heavy);
    }

    #[test]
    fn test_zero_weight_never_drawn() {
        let mut groups = WeightGroups::new();
        groups.add("g", "never", 0);
        groups.add("g", "always", 1);
        groups.add("empty", "nothing", 0);

        for _ in 0..100 {
            let draw = groups.draw();
            assert_eq!(draw["g"], "always");
            assert!(!draw.contains_key("empty"));
        }
    }

    #[test]
    fn test_one_choice_per_group() {
        let mut groups = WeightGroups::new();
        groups.add("a", "a1", 1);
        groups.add("b", "b1", 1);
        groups.add("b", "b2", 1);
        assert_eq!(groups.draw().len(), 2);
    }
}
