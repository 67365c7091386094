//! Sequential code allocation.
//!
//! Codes are advisory and human-facing, so anything that does not parse as
//! `<n>/<year>` is skipped rather than treated as an error.

use std::collections::BTreeSet;

use crate::models::{IncidentCode, IncidentId};

/// Next code for `year`: one past the highest known number, or `1`.
///
/// `None` once the year's numbering has reached `u32::MAX`.
///
/// # Examples
///
/// ```
/// use ronda_core::sequence::next_code;
///
/// let code = next_code(["1/2025", "2/2025", "9/2024", "garbage"], 2025);
/// assert_eq!(code.map(|code| code.to_string()).as_deref(), Some("3/2025"));
/// ```
pub fn next_code<I, S>(known_codes: I, year: i32) -> Option<IncidentCode>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let highest = known_codes
        .into_iter()
        .filter_map(|code| IncidentCode::parse(code.as_ref()))
        .filter(|code| code.year == year)
        .map(|code| code.number)
        .max()
        .unwrap_or(0);

    highest
        .checked_add(1)
        .map(|number| IncidentCode::new(number, year))
}

/// Re-derive a code for `record_id` after a collision.
///
/// Both code sources are unioned first, so the result collides with nothing
/// either side knew about at the time of the call.
pub fn reallocate<L, R, S, T>(
    record_id: &IncidentId,
    local_known_codes: L,
    remote_known_codes: R,
    year: i32,
) -> Option<IncidentCode>
where
    L: IntoIterator<Item = S>,
    R: IntoIterator<Item = T>,
    S: AsRef<str>,
    T: AsRef<str>,
{
    let known: BTreeSet<String> = local_known_codes
        .into_iter()
        .map(|code| code.as_ref().to_string())
        .chain(
            remote_known_codes
                .into_iter()
                .map(|code| code.as_ref().to_string()),
        )
        .collect();

    let code = next_code(&known, year);
    match code {
        Some(code) => tracing::debug!(
            "Reallocated code {} for incident {} from {} known codes",
            code,
            record_id,
            known.len()
        ),
        None => tracing::warn!(
            "No code left in {} for incident {}: numbering is exhausted",
            year,
            record_id
        ),
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_code_starts_at_one() {
        let none: [&str; 0] = [];
        assert_eq!(next_code(none, 2025), Some(IncidentCode::new(1, 2025)));
    }

    #[test]
    fn next_code_ignores_other_years_and_garbage() {
        let known = ["10/2024", "x/2025", "2/2025", "", "3/25", "1/2025"];
        assert_eq!(next_code(known, 2025), Some(IncidentCode::new(3, 2025)));
    }

    #[test]
    fn next_code_uses_max_not_count() {
        let known = ["1/2025", "7/2025"];
        assert_eq!(next_code(known, 2025), Some(IncidentCode::new(8, 2025)));
    }

    #[test]
    fn exhausted_numbering_yields_no_code() {
        let top = format!("{}/2025", u32::MAX);
        assert_eq!(next_code([top.as_str()], 2025), None);
        assert_eq!(
            reallocate(&IncidentId::new(), [top.as_str()], ["1/2025"], 2025),
            None
        );
        assert_eq!(next_code([top.as_str()], 2026), Some(IncidentCode::new(1, 2026)));
    }

    #[test]
    fn reallocate_unions_local_and_remote() {
        let id = IncidentId::new();
        let local = vec!["3/2025".to_string(), "5/2025".to_string()];
        let remote = ["1/2025", "2/2025", "3/2025", "4/2025"];
        assert_eq!(
            reallocate(&id, &local, remote, 2025),
            Some(IncidentCode::new(6, 2025))
        );
    }

    #[test]
    fn reallocate_with_remote_only_knowledge() {
        let id = IncidentId::new();
        let local: Vec<String> = Vec::new();
        let remote = ["1/2025", "2/2025", "3/2025"];
        assert_eq!(
            reallocate(&id, &local, remote, 2025),
            Some(IncidentCode::new(4, 2025))
        );
    }
}
