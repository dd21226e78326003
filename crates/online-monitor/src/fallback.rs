use std::collections::BTreeMap;

/// Most recent strictly positive reading per server, `None` until one is seen.
///
/// A zero reading from a server that has reported players before is treated
/// as a probe glitch and masked with the last positive value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastKnownGood {
    values: BTreeMap<String, Option<u32>>,
}

impl LastKnownGood {
    pub fn new<I, S>(server_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: server_ids.into_iter().map(|id| (id.into(), None)).collect(),
        }
    }

    /// Rebuilds the table for the configured ids, keeping saved values only
    /// for servers that are still configured.
    pub fn restore<I, S>(server_ids: I, mut saved: BTreeMap<String, Option<u32>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = server_ids
            .into_iter()
            .map(|id| {
                let id = id.into();
                let value = saved.remove(&id).flatten().filter(|v| *v > 0);
                (id, value)
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, server_id: &str) -> Option<u32> {
        self.values.get(server_id).copied().flatten()
    }

    /// Turns a raw reading into the value to display.
    ///
    /// `None` in, `None` out: a missing reading leaves the caller's slot alone.
    pub fn smooth(&mut self, server_id: &str, raw: Option<u32>) -> Option<u32> {
        match raw? {
            0 => Some(self.get(server_id).unwrap_or(0)),
            online => {
                self.values.insert(server_id.to_owned(), Some(online));
                Some(online)
            }
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, Option<u32>> {
        self.values.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::LastKnownGood;
    use std::collections::BTreeMap;

    #[test]
    fn first_zero_or_missing_reading_is_zero_or_untouched() {
        let mut lkg = LastKnownGood::new(["lobby"]);
        assert_eq!(lkg.smooth("lobby", Some(0)), Some(0));
        assert_eq!(lkg.smooth("lobby", None), None);
        assert_eq!(lkg.get("lobby"), None);
    }

    #[test]
    fn positive_reading_becomes_last_known_good() {
        let mut lkg = LastKnownGood::new(["lobby"]);
        assert_eq!(lkg.smooth("lobby", Some(12)), Some(12));
        assert_eq!(lkg.get("lobby"), Some(12));
        assert_eq!(lkg.smooth("lobby", Some(5)), Some(5));
        assert_eq!(lkg.get("lobby"), Some(5));
    }

    #[test]
    fn zero_after_positive_is_masked() {
        let mut lkg = LastKnownGood::new(["lobby", "uhc"]);
        lkg.smooth("lobby", Some(30));
        for _ in 0..3 {
            assert_eq!(lkg.smooth("lobby", Some(0)), Some(30));
        }
        assert_eq!(lkg.smooth("lobby", None), None);
        assert_eq!(lkg.get("lobby"), Some(30));
        assert_eq!(lkg.smooth("uhc", Some(0)), Some(0));
    }

    #[test]
    fn restore_keeps_only_configured_positive_values() {
        let saved = BTreeMap::from([
            ("lobby".to_owned(), Some(8)),
            ("retired".to_owned(), Some(99)),
            ("uhc".to_owned(), None),
        ]);
        let lkg = LastKnownGood::restore(["lobby", "uhc", "meetup"], saved);
        assert_eq!(
            lkg.to_map(),
            BTreeMap::from([
                ("lobby".to_owned(), Some(8)),
                ("meetup".to_owned(), None),
                ("uhc".to_owned(), None),
            ])
        );
    }
}
