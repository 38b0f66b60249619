use chrono::NaiveDate;
use scan_api::{ConversionValue, CoreError, MatchFragment, OutputType, Sensitivity, SimpleRule};
use serde_json::{json, Value};

/// Policy inputs externalised per §9 open questions (b) and (c): the
/// modulus-11 weight table and exception-date set are re-tunable, as are
/// the contextual bin filter's bin count and acceptance cutoff.
#[derive(Debug, Clone)]
pub struct CprPolicy {
    pub modulus_11_weights: [u32; 10],
    /// Years whose January 1st CPRs skip the modulus-11 check entirely —
    /// a fixed historical list of dates where Denmark issued CPR numbers
    /// that don't satisfy the checksum (§4.F).
    pub exception_years: Vec<i32>,
    pub bin_count: usize,
    pub bin_cutoff: f64,
}

impl Default for CprPolicy {
    fn default() -> Self {
        Self {
            modulus_11_weights: [4, 3, 2, 7, 6, 5, 4, 3, 2, 1],
            exception_years: vec![
                1960, 1962, 1964, 1965, 1966, 1967, 1969, 1970, 1974, 1975, 1978, 1980, 1981,
                1982, 1983, 1984, 1985, 1986, 1987, 1988, 1989, 1990, 1991, 1992, 1994, 1995,
            ],
            bin_count: 40,
            bin_cutoff: 0.15,
        }
    }
}

impl CprPolicy {
    fn is_exception_date(&self, date: NaiveDate) -> bool {
        use chrono::Datelike;
        date.month() == 1 && date.day() == 1 && self.exception_years.contains(&date.year())
    }

    fn modulus_11_ok(&self, digits: &[u8; 10]) -> bool {
        let sum: u32 = digits
            .iter()
            .zip(self.modulus_11_weights.iter())
            .map(|(&d, &w)| d as u32 * w)
            .sum();
        sum % 11 == 0
    }
}

/// Legal digit-7 (century indicator, the first digit of the 4-digit serial)
/// values for a given decoded year, per the published year bands (§4.F).
fn legal_7s(year: i32) -> &'static [u8] {
    match year {
        1858..=1899 => &[5, 6, 7, 8],
        1900..=1936 => &[0, 1, 2, 3],
        1937..=1999 => &[0, 1, 2, 3, 4, 9],
        2000..=2036 => &[4, 5, 6, 7, 8, 9],
        2037..=2057 => &[5, 6, 7, 8],
        _ => &[],
    }
}

fn digit7_to_year(day: u32, month: u32, yy: u32, digit7: u8) -> Option<i32> {
    let year = match digit7 {
        0..=3 => yy as i32 + 1900,
        4 => {
            if yy > 36 {
                yy as i32 + 1900
            } else {
                yy as i32 + 2000
            }
        }
        5..=8 => {
            if yy > 57 {
                yy as i32 + 1800
            } else {
                yy as i32 + 2000
            }
        }
        9 => {
            if yy > 37 {
                yy as i32 + 1900
            } else {
                yy as i32 + 2000
            }
        }
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, day).map(|_| year)
}

struct Candidate {
    digits: [u8; 10],
    offset: usize,
    date: NaiveDate,
    year: i32,
}

fn parse_candidate(text_digits: &str, offset: usize) -> Option<Candidate> {
    if text_digits.len() != 10 || !text_digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits: [u8; 10] = {
        let mut out = [0u8; 10];
        for (i, c) in text_digits.chars().enumerate() {
            out[i] = c.to_digit(10).unwrap() as u8;
        }
        out
    };
    let day = (digits[0] * 10 + digits[1]) as u32;
    let month = (digits[2] * 10 + digits[3]) as u32;
    let yy = (digits[4] * 10 + digits[5]) as u32;
    let digit7 = digits[6];
    let year = digit7_to_year(day, month, yy, digit7)?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    if date > chrono::Utc::now().date_naive() {
        return None; // future birth dates are invalid (§4.F)
    }
    Some(Candidate { digits, offset, date, year })
}

static CANDIDATE_PATTERN: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"\d{6}[-\s]?\d{4}").unwrap());

/// Scans `text` for 10-digit candidates (with an optional separator between
/// the date and the serial) and returns `(all candidates, those that pass
/// form + date + modulus-11)`, honouring the exception-date modulus-11
/// skip.
fn scan_candidates(text: &str, policy: &CprPolicy, modulus_11: bool) -> (Vec<Candidate>, Vec<usize>) {
    let mut numbers = Vec::new();
    for m in CANDIDATE_PATTERN.find_iter(text) {
        let digits_only: String = m.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
        if let Some(candidate) = parse_candidate(&digits_only, m.start()) {
            numbers.push(candidate);
        }
    }
    let mut cpr_indices = Vec::new();
    for (i, c) in numbers.iter().enumerate() {
        let exception = policy.is_exception_date(c.date);
        let passes_checksum = !modulus_11 || exception || policy.modulus_11_ok(&c.digits);
        if passes_checksum {
            cpr_indices.push(i);
        }
    }
    (numbers, cpr_indices)
}

/// Contextual bin filter (§4.F step 2): partitions the candidate span into
/// `bin_count` equal bins; a bin is locally accepted if empty or its
/// CPR-density meets `bin_cutoff`; a CPR only survives if its bin is
/// locally accepted *and* has an accepted neighbour (or is the only bin).
fn bin_filter(numbers: &[Candidate], cpr_indices: &[usize], policy: &CprPolicy) -> Vec<usize> {
    if numbers.is_empty() || cpr_indices.is_empty() {
        return Vec::new();
    }
    let first = numbers.iter().map(|c| c.offset).min().unwrap();
    let last = numbers.iter().map(|c| c.offset).max().unwrap();
    let span = (last - first).max(1);
    let bin_of = |offset: usize| -> usize {
        let frac = (offset - first) as f64 / span as f64;
        ((frac * policy.bin_count as f64) as usize).min(policy.bin_count - 1)
    };

    let mut all_counts = vec![0usize; policy.bin_count];
    let mut cpr_counts = vec![0usize; policy.bin_count];
    for c in numbers {
        all_counts[bin_of(c.offset)] += 1;
    }
    for &i in cpr_indices {
        cpr_counts[bin_of(numbers[i].offset)] += 1;
    }

    let locally_accepted: Vec<bool> = (0..policy.bin_count)
        .map(|b| all_counts[b] == 0 || (cpr_counts[b] as f64 / all_counts[b] as f64) >= policy.bin_cutoff)
        .collect();

    let finally_accepted: Vec<bool> = (0..policy.bin_count)
        .map(|b| {
            if !locally_accepted[b] {
                return false;
            }
            if policy.bin_count == 1 {
                return true;
            }
            let left = b.checked_sub(1).map(|l| locally_accepted[l]).unwrap_or(false);
            let right = (b + 1 < policy.bin_count).then(|| locally_accepted[b + 1]).unwrap_or(false);
            left || right
        })
        .collect();

    cpr_indices
        .iter()
        .copied()
        .filter(|&i| finally_accepted[bin_of(numbers[i].offset)])
        .collect()
}

/// Number of legal CPRs for a candidate's day (across every legal digit-7
/// value and 000..999 serial, filtered by modulus-11), and the candidate's
/// rank within that ordered list — used to band a reported probability
/// (§4.F step 3).
fn probability_rank(candidate: &Candidate, policy: &CprPolicy) -> (usize, usize) {
    let day = candidate.digits[0] * 10 + candidate.digits[1];
    let month = candidate.digits[2] * 10 + candidate.digits[3];
    let yy = candidate.digits[4] * 10 + candidate.digits[5];
    let mut legal = Vec::new();
    for &digit7 in legal_7s(candidate.year) {
        for serial in 0u32..1000 {
            let mut digits = [0u8; 10];
            digits[0] = day / 10;
            digits[1] = day % 10;
            digits[2] = month / 10;
            digits[3] = month % 10;
            digits[4] = yy / 10;
            digits[5] = yy % 10;
            digits[6] = digit7;
            digits[7] = (serial / 100) as u8;
            digits[8] = ((serial / 10) % 10) as u8;
            digits[9] = (serial % 10) as u8;
            if policy.modulus_11_ok(&digits) {
                legal.push(digits);
            }
        }
    }
    legal.sort();
    let rank = legal.iter().position(|d| *d == candidate.digits).unwrap_or(legal.len());
    (rank, legal.len())
}

fn probability_for(candidate: &Candidate, policy: &CprPolicy) -> f64 {
    if policy.is_exception_date(candidate.date) {
        return 0.5;
    }
    let (rank, _) = probability_rank(candidate, policy);
    match rank {
        r if r <= 100 => 1.0,
        r if r <= 200 => 0.8,
        r if r <= 250 => 0.6,
        r if r <= 350 => 0.25,
        _ => 0.1,
    }
}

/// Masks the last 6 digits of a reported match, per §4.F step 4
/// (`"DDMMXX-XXXX"`).
fn masked(digits: &[u8; 10]) -> String {
    format!("{}{}{}{}-XXXX", digits[0], digits[1], digits[2], digits[3])
}

/// Widens `[start, end)` outward to the nearest char boundaries before
/// slicing — the 20-byte context window around a candidate may land inside
/// a multi-byte UTF-8 sequence in the surrounding Danish text (`æøå`).
fn char_boundary_slice(text: &str, mut start: usize, mut end: usize) -> &str {
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    &text[start..end]
}

#[derive(Debug, Clone)]
pub struct CprRule {
    pub modulus_11: bool,
    pub examine_context: bool,
    /// Suppresses matches whose century inference lands in the legacy
    /// 1858-1899 band — CPRs that old describe people who, scanned live
    /// today, would be implausibly aged, and are rarely a meaningful find.
    pub ignore_irrelevant: bool,
    pub policy: CprPolicy,
    pub sensitivity: Option<Sensitivity>,
    pub name: Option<String>,
}

impl Default for CprRule {
    fn default() -> Self {
        Self {
            modulus_11: true,
            examine_context: true,
            ignore_irrelevant: false,
            policy: CprPolicy::default(),
            sensitivity: None,
            name: None,
        }
    }
}

impl SimpleRule for CprRule {
    fn operates_on(&self) -> OutputType {
        OutputType::Text
    }

    fn type_label(&self) -> &'static str {
        "cpr"
    }

    fn match_content(&self, content: &ConversionValue) -> Result<Vec<MatchFragment>, CoreError> {
        let ConversionValue::Text(text) = content else {
            return Err(CoreError::rule_bug("CprRule requires Text content"));
        };
        let (numbers, cpr_indices) = scan_candidates(text, &self.policy, self.modulus_11);
        let surviving = if self.examine_context {
            bin_filter(&numbers, &cpr_indices, &self.policy)
        } else {
            cpr_indices
        };

        let mut fragments = Vec::new();
        for i in surviving {
            let c = &numbers[i];
            if self.ignore_irrelevant && (1858..=1899).contains(&c.year) {
                continue;
            }
            let context_start = c.offset.saturating_sub(20);
            let context_end = (c.offset + 20).min(text.len());
            fragments.push(MatchFragment {
                matched: masked(&c.digits),
                probability: Some(probability_for(c, &self.policy)),
                sensitivity: self.sensitivity,
                offset: Some(c.offset),
                context: Some(char_boundary_slice(text, context_start, context_end).to_string()),
            });
        }
        Ok(fragments)
    }

    fn sensitivity(&self) -> Option<Sensitivity> {
        self.sensitivity
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn to_json_object(&self) -> Value {
        json!({
            "type": "cpr",
            "modulus_11": self.modulus_11,
            "examine_context": self.examine_context,
            "ignore_irrelevant": self.ignore_irrelevant,
        })
    }
}

impl CprRule {
    /// Decodes the fields `to_json_object` writes; the policy tunables
    /// (§9 open questions b/c) are not round-tripped through the wire
    /// format and fall back to `CprPolicy::default()`, matching every other
    /// deployment-facing rule constructor in this module.
    pub fn from_json(obj: &Value) -> Option<Self> {
        if obj.get("type")?.as_str()? != "cpr" {
            return None;
        }
        Some(Self {
            modulus_11: obj.get("modulus_11").and_then(Value::as_bool).unwrap_or(true),
            examine_context: obj.get("examine_context").and_then(Value::as_bool).unwrap_or(true),
            ignore_irrelevant: obj.get("ignore_irrelevant").and_then(Value::as_bool).unwrap_or(false),
            policy: CprPolicy::default(),
            sensitivity: Sensitivity::make_from_dict(obj),
            name: obj.get("name").and_then(Value::as_str).map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_match(rule: &CprRule, text: &str) -> Vec<MatchFragment> {
        rule.match_content(&ConversionValue::Text(text.to_string())).unwrap()
    }

    #[test]
    fn modulus_11_valid_cpr_matches() {
        // 220599-5008: day 22/05, yy 99, digit7 5 -> 1858-1899 band -> 1899.
        // sum = 2*4+2*3+0*2+5*7+9*6+9*5+5*4+0*3+0*2+8*1 = 176, 176 % 11 == 0.
        let rule = CprRule { examine_context: false, ..Default::default() };
        let fragments = text_match(&rule, "mit cpr er 2205995008 tak");
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].matched, "2205-XXXX");
    }

    #[test]
    fn ignore_irrelevant_suppresses_legacy_band() {
        let rule = CprRule { examine_context: false, ignore_irrelevant: true, ..Default::default() };
        let fragments = text_match(&rule, "2205995008");
        assert!(fragments.is_empty(), "1899 birth year should be suppressed as irrelevant");
    }

    #[test]
    fn exception_date_skips_modulus_11() {
        // 2 Jan 1st 1960 is in the exception-year list; craft a serial that
        // fails the checksum to prove the skip actually fires.
        let policy = CprPolicy::default();
        // find a digit7 legal for 1960 (0..=3) and a serial that fails checksum
        let mut digits = [0u8, 1, 0, 1, 6, 0, 0, 0, 0, 0];
        while policy.modulus_11_ok(&digits) {
            digits[9] += 1;
        }
        let text: String = digits.iter().map(|d| d.to_string()).collect();
        let rule = CprRule { examine_context: false, ..Default::default() };
        let fragments = text_match(&rule, &text);
        assert_eq!(fragments.len(), 1, "exception-date CPR must match despite failing modulus-11");
        assert_eq!(fragments[0].probability, Some(0.5));
    }

    #[test]
    fn bin_filter_rejects_isolated_cpr_among_scattered_noise() {
        // One real CPR surrounded by 39 non-CPR 10-digit numbers spread
        // across a wide span: the real CPR's bin has a local density of
        // 1-in-1 (itself) but no accepted neighbour bin, so it's dropped —
        // unless it lands in the same bin as enough noise to pass alone,
        // this models testable property 9's isolated case structurally
        // (an identical single entry, far from any other CPR, surrounded by
        // dense non-CPR noise in neighbouring bins).
        let mut text = String::new();
        let mut expected_offset = None;
        for i in 0..40 {
            let offset_before = text.len();
            if i == 19 {
                // the one real, isolated CPR
                text.push_str("2205995008 ");
                expected_offset = Some(offset_before);
            } else {
                // non-CPR noise: fails modulus-11 and isn't an exception date
                text.push_str("1111111111 ");
            }
        }
        assert!(expected_offset.is_some());
        let rule = CprRule::default();
        let fragments = text_match(&rule, &text);
        assert!(fragments.is_empty(), "an isolated CPR with no accepting neighbour bin must be filtered out");
    }

    #[test]
    fn context_window_does_not_split_a_multibyte_char() {
        // Each "—" is 3 bytes, so a 20-byte context window from a multiple
        // of 3 lands mid-character on both edges; this must not panic.
        let text = format!("{}2205995008{}", "—".repeat(14), "—".repeat(14));
        let rule = CprRule { examine_context: false, ..Default::default() };
        let fragments = text_match(&rule, &text);
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].context.as_ref().unwrap().contains("2205995008"));
    }
}
