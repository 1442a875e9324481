//! Byte-column layout of the exchange's COTAHIST fixed-width quote file.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("layout has {names} field names but {offsets} offset pairs")]
    CountMismatch { names: usize, offsets: usize },

    #[error("unknown field name `{0}`")]
    UnknownField(String),

    #[error("field `{0}` has an empty or inverted byte range")]
    EmptyRange(&'static str),

    #[error("field `{next}` starts at {start} before `{prev}` ends at {end}")]
    Overlap {
        prev: &'static str,
        end: usize,
        next: &'static str,
        start: usize,
    },

    #[error("field `{0}` appears more than once")]
    DuplicateField(&'static str),

    #[error("required field `{0}` is missing")]
    MissingField(&'static str),
}

/// Columns the decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    RecordType,
    TradeDate,
    SegmentCode,
    Ticker,
    CompanyName,
    Open,
    High,
    Low,
    Average,
    Close,
    TradedQuantity,
    FinancialVolume,
}

impl Field {
    pub const COUNT: usize = 12;

    pub const ALL: [Field; Field::COUNT] = [
        Field::RecordType,
        Field::TradeDate,
        Field::SegmentCode,
        Field::Ticker,
        Field::CompanyName,
        Field::Open,
        Field::High,
        Field::Low,
        Field::Average,
        Field::Close,
        Field::TradedQuantity,
        Field::FinancialVolume,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Field::RecordType => "record_type",
            Field::TradeDate => "trade_date",
            Field::SegmentCode => "segment_code",
            Field::Ticker => "ticker",
            Field::CompanyName => "company_name",
            Field::Open => "open",
            Field::High => "high",
            Field::Low => "low",
            Field::Average => "avg_price",
            Field::Close => "close",
            Field::TradedQuantity => "traded_quantity",
            Field::FinancialVolume => "financial_volume",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Field::ALL.into_iter().find(|f| f.name() == name)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutVersion {
    /// Historical quote file (COTAHIST) with 245-byte records.
    CotahistV1,
}

const COTAHIST_V1_OFFSETS: [(usize, usize); Field::COUNT] = [
    (0, 2),
    (2, 10),
    (10, 12),
    (12, 24),
    (27, 39),
    (56, 69),
    (69, 82),
    (82, 95),
    (95, 108),
    (108, 121),
    (152, 170),
    (170, 188),
];

const COTAHIST_V1_NAMES: [&str; Field::COUNT] = [
    "record_type",
    "trade_date",
    "segment_code",
    "ticker",
    "company_name",
    "open",
    "high",
    "low",
    "avg_price",
    "close",
    "traded_quantity",
    "financial_volume",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub start: usize,
    pub end: usize,
    pub field: Field,
}

/// An ordered, validated list of `(start, end, field)` byte ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    version: LayoutVersion,
    fields: Vec<FieldSpec>,
    spans: [Range<usize>; Field::COUNT],
}

impl RecordLayout {
    pub fn for_version(version: LayoutVersion) -> Result<Self, LayoutError> {
        match version {
            LayoutVersion::CotahistV1 => Self::from_parts(version, &COTAHIST_V1_OFFSETS, &COTAHIST_V1_NAMES),
        }
    }

    /// Pair offsets with field names and validate the result.
    pub fn from_parts(
        version: LayoutVersion,
        offsets: &[(usize, usize)],
        names: &[&str],
    ) -> Result<Self, LayoutError> {
        if offsets.len() != names.len() {
            return Err(LayoutError::CountMismatch {
                names: names.len(),
                offsets: offsets.len(),
            });
        }

        let fields = offsets
            .iter()
            .zip(names)
            .map(|(&(start, end), name)| {
                Field::from_name(name)
                    .map(|field| FieldSpec { start, end, field })
                    .ok_or_else(|| LayoutError::UnknownField(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        validate(&fields)?;

        let mut spans: [Range<usize>; Field::COUNT] = Default::default();
        for spec in &fields {
            spans[spec.field.index()] = spec.start..spec.end;
        }

        Ok(Self { version, fields, spans })
    }

    pub fn version(&self) -> LayoutVersion {
        self.version
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Byte range of `field` within a record.
    pub fn span(&self, field: Field) -> Range<usize> {
        self.spans[field.index()].clone()
    }

    /// Shortest line that holds every field.
    pub fn min_line_len(&self) -> usize {
        self.fields.iter().map(|f| f.end).max().unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        validate(&self.fields)
    }
}

/// Ranges must be non-empty, ordered and non-overlapping
/// (`end[i] <= start[i + 1]`), and every known field must appear exactly once.
pub fn validate(fields: &[FieldSpec]) -> Result<(), LayoutError> {
    for spec in fields {
        if spec.start >= spec.end {
            return Err(LayoutError::EmptyRange(spec.field.name()));
        }
    }

    for pair in fields.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.end > next.start {
            return Err(LayoutError::Overlap {
                prev: prev.field.name(),
                end: prev.end,
                next: next.field.name(),
                start: next.start,
            });
        }
    }

    let mut seen = [false; Field::COUNT];
    for spec in fields {
        if std::mem::replace(&mut seen[spec.field.index()], true) {
            return Err(LayoutError::DuplicateField(spec.field.name()));
        }
    }
    if let Some(missing) = Field::ALL.into_iter().find(|f| !seen[f.index()]) {
        return Err(LayoutError::MissingField(missing.name()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cotahist_layout_is_valid() {
        let layout = RecordLayout::for_version(LayoutVersion::CotahistV1).unwrap();
        assert_eq!(layout.fields().len(), Field::COUNT);
        assert_eq!(layout.min_line_len(), 188);
        assert_eq!(layout.span(Field::TradeDate), 2..10);
        assert_eq!(layout.span(Field::Close), 108..121);
        for pair in layout.fields().windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn test_count_mismatch() {
        let err = RecordLayout::from_parts(
            LayoutVersion::CotahistV1,
            &COTAHIST_V1_OFFSETS[..11],
            &COTAHIST_V1_NAMES,
        )
        .unwrap_err();
        assert_eq!(err, LayoutError::CountMismatch { names: 12, offsets: 11 });
    }

    #[test]
    fn test_overlap_is_rejected() {
        let mut offsets = COTAHIST_V1_OFFSETS;
        offsets[3] = (12, 30); // ticker runs into company_name
        let err = RecordLayout::from_parts(LayoutVersion::CotahistV1, &offsets, &COTAHIST_V1_NAMES).unwrap_err();
        assert_eq!(
            err,
            LayoutError::Overlap {
                prev: "ticker",
                end: 30,
                next: "company_name",
                start: 27,
            }
        );
    }

    #[test]
    fn test_empty_range_is_rejected() {
        let mut offsets = COTAHIST_V1_OFFSETS;
        offsets[2] = (10, 10);
        let err = RecordLayout::from_parts(LayoutVersion::CotahistV1, &offsets, &COTAHIST_V1_NAMES).unwrap_err();
        assert_eq!(err, LayoutError::EmptyRange("segment_code"));
    }

    #[test]
    fn test_unknown_and_duplicate_names() {
        let mut names = COTAHIST_V1_NAMES;
        names[4] = "nome_empresa";
        let err = RecordLayout::from_parts(LayoutVersion::CotahistV1, &COTAHIST_V1_OFFSETS, &names).unwrap_err();
        assert_eq!(err, LayoutError::UnknownField("nome_empresa".into()));

        let mut names = COTAHIST_V1_NAMES;
        names[4] = "ticker";
        let err = RecordLayout::from_parts(LayoutVersion::CotahistV1, &COTAHIST_V1_OFFSETS, &names).unwrap_err();
        assert_eq!(err, LayoutError::DuplicateField("ticker"));
    }

    #[test]
    fn test_missing_field() {
        let err = RecordLayout::from_parts(
            LayoutVersion::CotahistV1,
            &COTAHIST_V1_OFFSETS[..11],
            &COTAHIST_V1_NAMES[..11],
        )
        .unwrap_err();
        assert_eq!(err, LayoutError::MissingField("financial_volume"));
    }

    fn widths_to_offsets(gaps_and_widths: &[(usize, usize)]) -> Vec<(usize, usize)> {
        let mut cursor = 0;
        gaps_and_widths
            .iter()
            .map(|&(gap, width)| {
                let start = cursor + gap;
                cursor = start + width;
                (start, cursor)
            })
            .collect()
    }

    proptest! {
        #[test]
        fn prop_ordered_disjoint_layouts_validate(
            parts in proptest::collection::vec((0usize..8, 1usize..20), Field::COUNT)
        ) {
            let offsets = widths_to_offsets(&parts);
            let layout = RecordLayout::from_parts(LayoutVersion::CotahistV1, &offsets, &COTAHIST_V1_NAMES).unwrap();
            for pair in layout.fields().windows(2) {
                prop_assert!(pair[0].end <= pair[1].start);
            }
            prop_assert_eq!(layout.min_line_len(), offsets[Field::COUNT - 1].1);
        }

        #[test]
        fn prop_any_overlap_is_rejected(
            parts in proptest::collection::vec((0usize..8, 2usize..20), Field::COUNT),
            at in 1usize..Field::COUNT,
        ) {
            let mut offsets = widths_to_offsets(&parts);
            // pull field `at` back so it starts inside its predecessor
            let prev_end = offsets[at - 1].1;
            let width = offsets[at].1 - offsets[at].0;
            offsets[at] = (prev_end - 1, prev_end - 1 + width);
            let result = RecordLayout::from_parts(LayoutVersion::CotahistV1, &offsets, &COTAHIST_V1_NAMES);
            let is_overlap = matches!(result, Err(LayoutError::Overlap { .. }));
            prop_assert!(is_overlap);
        }
    }
}
