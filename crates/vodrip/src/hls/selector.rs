// HLS Variant Selector: picks one rendition out of a master playlist.

use crate::hls::playlist::Variant;
use std::collections::BTreeMap;
use tracing::debug;

/// Numeric quality shorthands ("720") mapped to the resolution they stand for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityTable {
    entries: BTreeMap<String, String>,
}

impl Default for QualityTable {
    fn default() -> Self {
        Self::new([
            ("240", "428x240"),
            ("360", "640x360"),
            ("480", "848x480"),
            ("720", "1280x720"),
            ("1080", "1920x1080"),
        ])
    }
}

impl QualityTable {
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn insert(&mut self, shorthand: impl Into<String>, resolution: impl Into<String>) {
        self.entries.insert(shorthand.into(), resolution.into());
    }

    pub fn lookup(&self, shorthand: &str) -> Option<&str> {
        self.entries.get(shorthand).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualitySelector {
    /// Widest rendition
    Max,
    /// Narrowest rendition
    Min,
    /// Exact `WIDTHxHEIGHT` match
    Exact(String),
}

impl QualitySelector {
    /// Interpret a user supplied quality string. Shorthands are expanded through
    /// `table` before falling back to an exact match.
    pub fn parse(quality: &str, table: &QualityTable) -> Self {
        let quality = quality.trim();
        match quality.to_ascii_lowercase().as_str() {
            "max" => QualitySelector::Max,
            "min" => QualitySelector::Min,
            _ => match table.lookup(quality) {
                Some(resolution) => QualitySelector::Exact(resolution.to_string()),
                None => QualitySelector::Exact(quality.to_string()),
            },
        }
    }
}

impl std::fmt::Display for QualitySelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualitySelector::Max => f.write_str("max"),
            QualitySelector::Min => f.write_str("min"),
            QualitySelector::Exact(resolution) => f.write_str(resolution),
        }
    }
}

/// Outcome of a selection. `available` is always filled so callers can show
/// what the stream offers even when nothing matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub available: Vec<String>,
    pub chosen: Option<Variant>,
}

/// Select a variant. Variants sharing a width are collapsed to the one with
/// the highest bandwidth before matching.
pub fn select(variants: &[Variant], selector: &QualitySelector) -> Selection {
    let mut by_width: BTreeMap<u64, &Variant> = BTreeMap::new();
    for variant in variants {
        by_width
            .entry(variant.width)
            .and_modify(|current| {
                if variant.bandwidth > current.bandwidth {
                    *current = variant;
                }
            })
            .or_insert(variant);
    }

    let available: Vec<String> = by_width.values().map(|v| v.resolution()).collect();

    let chosen = match selector {
        QualitySelector::Max => by_width.values().next_back(),
        QualitySelector::Min => by_width.values().next(),
        QualitySelector::Exact(resolution) => by_width
            .values()
            .find(|v| v.resolution() == *resolution),
    }
    .map(|v| (*v).clone());

    debug!(
        selector = %selector,
        available = %available.join(", "),
        chosen = ?chosen.as_ref().map(Variant::resolution),
        "Variant selection"
    );

    Selection { available, chosen }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn variant(width: u64, height: u64, bandwidth: u64) -> Variant {
        Variant {
            width,
            height,
            bandwidth,
            uri: Url::parse(&format!("https://cdn.example.com/{width}x{height}_{bandwidth}.m3u8"))
                .unwrap(),
        }
    }

    fn ladder() -> Vec<Variant> {
        vec![
            variant(1280, 720, 2_500_000),
            variant(426, 240, 400_000),
            variant(1920, 1080, 5_000_000),
        ]
    }

    #[test]
    fn max_and_min_pick_by_width() {
        let table = QualityTable::default();
        let variants = ladder();

        let max = select(&variants, &QualitySelector::parse("max", &table));
        assert_eq!(max.chosen.unwrap().resolution(), "1920x1080");

        let min = select(&variants, &QualitySelector::parse("min", &table));
        assert_eq!(min.chosen.unwrap().resolution(), "426x240");
    }

    #[test]
    fn numeric_shorthand_expands_before_matching() {
        let table = QualityTable::default();
        assert_eq!(
            QualitySelector::parse("720", &table),
            QualitySelector::Exact("1280x720".to_string())
        );

        let selection = select(&ladder(), &QualitySelector::parse("720", &table));
        assert_eq!(selection.chosen.unwrap().resolution(), "1280x720");
    }

    #[test]
    fn shorthand_without_matching_variant_reports_available() {
        let table = QualityTable::default();
        // 240 maps to 428x240, the ladder only has 426x240
        let selection = select(&ladder(), &QualitySelector::parse("240", &table));
        assert!(selection.chosen.is_none());
        assert_eq!(
            selection.available,
            vec!["426x240", "1280x720", "1920x1080"]
        );
    }

    #[test]
    fn exact_resolution_and_case_insensitive_sentinels() {
        let table = QualityTable::default();
        let selection = select(&ladder(), &QualitySelector::parse("1920x1080", &table));
        assert_eq!(selection.chosen.unwrap().bandwidth, 5_000_000);

        assert_eq!(QualitySelector::parse(" MAX ", &table), QualitySelector::Max);
    }

    #[test]
    fn duplicate_widths_keep_highest_bandwidth() {
        let table = QualityTable::default();
        let variants = vec![
            variant(1280, 720, 1_500_000),
            variant(1280, 720, 3_000_000),
            variant(640, 360, 800_000),
            variant(640, 360, 600_000),
            variant(1280, 720, 2_000_000),
        ];

        let selection = select(&variants, &QualitySelector::parse("720", &table));
        assert_eq!(selection.available, vec!["640x360", "1280x720"]);
        assert_eq!(selection.chosen.unwrap().bandwidth, 3_000_000);

        let min = select(&variants, &QualitySelector::Min);
        assert_eq!(min.chosen.unwrap().bandwidth, 800_000);

        let max = select(&variants, &QualitySelector::Max);
        assert_eq!(max.chosen.unwrap().bandwidth, 3_000_000);
    }

    #[test]
    fn custom_table_entries_are_honoured() {
        let mut table = QualityTable::default();
        table.insert("240", "426x240");
        let selection = select(&ladder(), &QualitySelector::parse("240", &table));
        assert_eq!(selection.chosen.unwrap().resolution(), "426x240");
    }

    #[test]
    fn empty_variant_list_selects_nothing() {
        let selection = select(&[], &QualitySelector::Max);
        assert!(selection.chosen.is_none());
        assert!(selection.available.is_empty());
    }
}
