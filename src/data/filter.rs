use std::collections::BTreeSet;

use super::model::{Field, RecordSet, Value, month_names};

// ---------------------------------------------------------------------------
// Filter selection: which values are selected per dimension
// ---------------------------------------------------------------------------

/// Country / year / month selections.
/// An empty set on a dimension means "no filter" (show all).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub countries: BTreeSet<String>,
    pub years: BTreeSet<i32>,
    /// English month names, e.g. `"March"`.
    pub months: BTreeSet<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_countries<I, S>(mut self, countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.countries = countries.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_years<I: IntoIterator<Item = i32>>(mut self, years: I) -> Self {
        self.years = years.into_iter().collect();
        self
    }

    pub fn with_months<I, S>(mut self, months: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.months = months.into_iter().map(Into::into).collect();
        self
    }

    /// Whether no dimension is constrained.
    pub fn is_empty(&self) -> bool {
        self.countries.is_empty() && self.years.is_empty() && self.months.is_empty()
    }
}

/// Return the records that pass every active filter.
///
/// A record passes a dimension when:
/// * The selection for that dimension is empty → passes (no constraint)
/// * The record's value is in the selected set → passes
/// * The record's value is null → fails any non-empty selection
pub fn filter_records(records: &RecordSet, selection: &Selection) -> RecordSet {
    let filtered = records.subset(|rec| {
        if !selection.countries.is_empty() {
            match &rec.country {
                Some(c) if selection.countries.contains(c) => {}
                _ => return false,
            }
        }
        if !selection.years.is_empty() {
            match rec.year() {
                Some(y) if selection.years.contains(&y) => {}
                _ => return false,
            }
        }
        if !selection.months.is_empty() {
            match rec.month_name() {
                Some(m) if selection.months.contains(m) => {}
                _ => return false,
            }
        }
        true
    });
    log::debug!(
        "filter {:?} kept {} of {} records",
        selection,
        filtered.len(),
        records.len()
    );
    filtered
}

/// Month names available once the year selection is applied, in calendar
/// order. Country and month selections are deliberately ignored.
pub fn month_options(records: &RecordSet, years: &BTreeSet<i32>) -> Vec<&'static str> {
    let present: BTreeSet<&'static str> = records
        .iter()
        .filter(|rec| years.is_empty() || rec.year().is_some_and(|y| years.contains(&y)))
        .filter_map(|rec| rec.month_name())
        .collect();
    month_names().filter(|m| present.contains(m)).collect()
}

/// Choices offered for each filter dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    /// Sorted distinct countries.
    pub countries: Vec<String>,
    /// Sorted distinct years.
    pub years: Vec<i32>,
    /// Months present for the current year selection, calendar order.
    pub months: Vec<&'static str>,
}

/// Compute the selector choices for the given year selection.
pub fn filter_options(records: &RecordSet, selected_years: &BTreeSet<i32>) -> FilterOptions {
    let countries = records
        .unique_values(Field::Country)
        .into_iter()
        .filter_map(|v| match v {
            Value::Text(s) => Some(s),
            _ => None,
        })
        .collect();
    let years: BTreeSet<i32> = records.iter().filter_map(|r| r.year()).collect();
    FilterOptions {
        countries,
        years: years.into_iter().collect(),
        months: month_options(records, selected_years),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::data::model::{CalendarDate, IncidentRecord};

    fn rec(id: &str, country: Option<&str>, date: Option<(i32, u32)>) -> IncidentRecord {
        IncidentRecord {
            violation_id: Some(id.to_string()),
            country: country.map(str::to_string),
            date: date.map(|(y, m)| {
                CalendarDate::new(NaiveDate::from_ymd_opt(y, m, 1).unwrap())
            }),
            total_victims: Some(1),
            ..Default::default()
        }
    }

    fn sample() -> RecordSet {
        RecordSet::from_records(vec![
            rec("V1", Some("Syria"), Some((2020, 3))),
            rec("V2", Some("Lebanon"), Some((2020, 1))),
            rec("V3", Some("Syria"), Some((2021, 7))),
            rec("V4", None, Some((2021, 3))),
            rec("V5", Some("Jordan"), None),
        ])
    }

    fn ids(set: &RecordSet) -> Vec<String> {
        set.iter().filter_map(|r| r.violation_id.clone()).collect()
    }

    #[test]
    fn empty_selection_passes_everything() {
        let all = sample();
        let out = filter_records(&all, &Selection::new());
        assert_eq!(out.len(), all.len());
    }

    #[test]
    fn empty_dimension_equals_selecting_every_value() {
        let all = sample();
        let every_year: Vec<i32> = filter_options(&all, &BTreeSet::new()).years;
        let by_country = Selection::new().with_countries(["Syria"]);
        let explicit = by_country.clone().with_years(every_year);
        // Null years never match an explicit selection, so compare on rows
        // that have a year.
        let implicit_ids: Vec<String> = filter_records(&all, &by_country)
            .subset(|r| r.year().is_some())
            .iter()
            .filter_map(|r| r.violation_id.clone())
            .collect();
        assert_eq!(implicit_ids, ids(&filter_records(&all, &explicit)));
    }

    #[test]
    fn nulls_never_match_a_non_empty_selection() {
        let all = sample();
        let out = filter_records(&all, &Selection::new().with_countries(["Syria", "Jordan"]));
        assert_eq!(ids(&out), vec!["V1", "V3", "V5"]);

        let out = filter_records(&all, &Selection::new().with_years([2020, 2021]));
        assert_eq!(ids(&out), vec!["V1", "V2", "V3", "V4"]);
    }

    #[test]
    fn dimensions_combine_with_and() {
        let all = sample();
        let sel = Selection::new()
            .with_countries(["Syria"])
            .with_years([2021])
            .with_months(["July", "March"]);
        assert_eq!(ids(&filter_records(&all, &sel)), vec!["V3"]);

        let sel = Selection::new().with_countries(["Lebanon"]).with_months(["March"]);
        assert!(filter_records(&all, &sel).is_empty());
    }

    #[test]
    fn month_options_follow_year_selection_in_calendar_order() {
        let all = sample();
        assert_eq!(
            month_options(&all, &BTreeSet::from([2020])),
            vec!["January", "March"]
        );
        assert_eq!(
            month_options(&all, &BTreeSet::new()),
            vec!["January", "March", "July"]
        );
        assert!(month_options(&all, &BTreeSet::from([1999])).is_empty());
    }

    #[test]
    fn options_are_sorted_and_skip_nulls() {
        let opts = filter_options(&sample(), &BTreeSet::from([2021]));
        assert_eq!(opts.countries, vec!["Jordan", "Lebanon", "Syria"]);
        assert_eq!(opts.years, vec![2020, 2021]);
        assert_eq!(opts.months, vec!["March", "July"]);
    }
}
