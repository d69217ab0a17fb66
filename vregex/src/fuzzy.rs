/*!
Score-based fuzzy matching, used by completion and interactive finders.

The scorer is fzy-derived: each pattern char must appear in order in the
candidate, and a dynamic program picks the highest-scoring assignment of
positions, rewarding matches after separators, camel-case transitions and
consecutive runs, and penalizing gaps.

Scores are reported as integers (the raw score scaled by 1000); a candidate
equal to the pattern (ignoring case) scores [`i32::MAX`]. Patterns and
candidates are capped at 256 code points; longer candidates never match.
*/

use bon::Builder;
use itertools::Itertools;

use crate::{
    buffer::{decode_char, LineProvider, Pos},
    chartab::ChartabView,
};
use vregex_unicode::case::CharCaseExt;

/// Maximum pattern/candidate length in code points.
pub const MATCH_MAX_LEN: usize = 256;

const SCORE_GAP_LEADING: f64 = -0.005;
const SCORE_GAP_TRAILING: f64 = -0.005;
const SCORE_GAP_INNER: f64 = -0.01;
const SCORE_MATCH_CONSECUTIVE: f64 = 1.0;
const SCORE_MATCH_SLASH: f64 = 0.9;
const SCORE_MATCH_WORD: f64 = 0.8;
const SCORE_MATCH_CAPITAL: f64 = 0.7;
const SCORE_MATCH_DOT: f64 = 0.6;
const SCORE_SCALE: f64 = 1000.0;

const SCORE_MIN: f64 = f64::NEG_INFINITY;
const SCORE_MAX: f64 = f64::INFINITY;

fn is_word_sep(c: char) -> bool {
    c == '-' || c == '_' || c == ' '
}

/// Every pattern char must appear in the candidate, in order. Quick reject
/// before running the dynamic program.
fn has_match(needle: &str, haystack: &str) -> bool {
    let mut hay = haystack.chars();
    for n in needle.chars() {
        let upper = n.to_upper_char();
        if !hay.any(|h| h == n || h == upper) {
            return false;
        }
    }
    true
}

fn compute_bonus(last_c: char, c: char) -> f64 {
    if c.is_ascii_alphanumeric() || c.is_alphanumeric() || c == '_' {
        if last_c == '/' {
            return SCORE_MATCH_SLASH;
        }
        if is_word_sep(last_c) {
            return SCORE_MATCH_WORD;
        }
        if last_c == '.' {
            return SCORE_MATCH_DOT;
        }
        if c.is_uppercase() && last_c.is_lowercase() {
            return SCORE_MATCH_CAPITAL;
        }
    }
    0.0
}

struct MatchSetup {
    needle: Vec<char>,
    haystack: Vec<char>,
    bonus: Vec<f64>,
}

impl MatchSetup {
    fn new(needle: &str, haystack: &str) -> MatchSetup {
        let needle: Vec<char> = needle
            .chars()
            .take(MATCH_MAX_LEN)
            .map(|c| c.to_lower_char())
            .collect();
        let mut bonus = Vec::new();
        let mut hay = Vec::new();
        let mut prev = '/';
        for c in haystack.chars().take(MATCH_MAX_LEN) {
            hay.push(c.to_lower_char());
            bonus.push(compute_bonus(prev, c));
            prev = c;
        }
        MatchSetup { needle, haystack: hay, bonus }
    }
}

fn match_row(
    setup: &MatchSetup,
    row: usize,
    curr_d: &mut [f64],
    curr_m: &mut [f64],
    last_d: &[f64],
    last_m: &[f64],
) {
    let n = setup.needle.len();
    let m = setup.haystack.len();
    let gap_score =
        if row == n - 1 { SCORE_GAP_TRAILING } else { SCORE_GAP_INNER };

    let mut prev_score = SCORE_MIN;
    let mut prev_m = SCORE_MIN;
    let mut prev_d = SCORE_MIN;
    for j in 0..m {
        if setup.needle[row] == setup.haystack[j] {
            let mut score = SCORE_MIN;
            if row == 0 {
                score = (j as f64) * SCORE_GAP_LEADING + setup.bonus[j];
            } else if j > 0 {
                // consecutive match, doesn't stack with the bonus
                score = (prev_m + setup.bonus[j])
                    .max(prev_d + SCORE_MATCH_CONSECUTIVE);
            }
            prev_d = last_d[j];
            prev_m = last_m[j];
            curr_d[j] = score;
            prev_score = score.max(prev_score + gap_score);
            curr_m[j] = prev_score;
        } else {
            prev_d = last_d[j];
            prev_m = last_m[j];
            curr_d[j] = SCORE_MIN;
            prev_score += gap_score;
            curr_m[j] = prev_score;
        }
    }
}

/// Score one pattern word against the candidate and report the matched char
/// positions. The backtrace prefers the latest positions in the candidate
/// among equally-scored paths.
fn match_positions(needle: &str, haystack: &str) -> Option<(f64, Vec<u32>)> {
    if needle.is_empty() {
        return None;
    }
    let n_total = needle.chars().count();
    let m_total = haystack.chars().count();
    if m_total > MATCH_MAX_LEN || n_total > m_total {
        // Unreasonably large candidate, or more pattern than candidate.
        // An oversized candidate still matches when it equals the pattern.
        if n_total == m_total
            && needle
                .chars()
                .zip(haystack.chars())
                .all(|(a, b)| a.to_lower_char() == b.to_lower_char())
        {
            return Some((SCORE_MAX, (0..MATCH_MAX_LEN as u32).collect()));
        }
        return None;
    }
    if n_total == m_total {
        // has_match() held, so equal lengths means the strings are equal
        // ignoring case.
        return Some((SCORE_MAX, (0..n_total as u32).collect()));
    }
    let setup = MatchSetup::new(needle, haystack);
    let n = setup.needle.len();
    let m = setup.haystack.len();

    // d[i][j]: best score ending with a match at j; m[i][j]: best score.
    let mut d = vec![vec![0.0f64; m]; n];
    let mut mm = vec![vec![0.0f64; m]; n];

    {
        let (first_d, first_m) = (&mut d[0], &mut mm[0]);
        let zero_d = vec![SCORE_MIN; m];
        let zero_m = vec![SCORE_MIN; m];
        match_row(&setup, 0, first_d, first_m, &zero_d, &zero_m);
    }
    for i in 1..n {
        let (prev_d, rest_d) = d.split_at_mut(i);
        let (prev_m, rest_m) = mm.split_at_mut(i);
        match_row(
            &setup,
            i,
            &mut rest_d[0],
            &mut rest_m[0],
            &prev_d[i - 1],
            &prev_m[i - 1],
        );
    }

    let mut positions = vec![0u32; n];
    let mut match_required = false;
    let mut j = m as isize - 1;
    for i in (0..n).rev() {
        while j >= 0 {
            let ju = j as usize;
            if d[i][ju] != SCORE_MIN && (match_required || d[i][ju] == mm[i][ju])
            {
                // A consecutive-run score pins the previous char to a match.
                match_required = i > 0
                    && ju > 0
                    && mm[i][ju] == d[i - 1][ju - 1] + SCORE_MATCH_CONSECUTIVE;
                positions[i] = ju as u32;
                j -= 1;
                break;
            }
            j -= 1;
        }
    }

    Some((mm[n - 1][m - 1], positions))
}

fn scale_score(score: f64) -> i32 {
    if score == SCORE_MIN {
        i32::MIN + 1
    } else if score == SCORE_MAX {
        i32::MAX
    } else if score < 0.0 {
        (score * SCORE_SCALE - 0.5).ceil() as i32
    } else {
        (score * SCORE_SCALE + 0.5).floor() as i32
    }
}

/// Fuzzy-match `pat` in `text`.
///
/// With `matchseq` the whole pattern (spaces included) must match in
/// sequence. Otherwise the pattern is split on whitespace and every word is
/// scored independently against the whole candidate; the scores are summed
/// with saturation.
///
/// Returns the scaled score and the matched char positions, or `None` when
/// any pattern word fails to match.
pub fn fuzzy_match(
    text: &str,
    pat: &str,
    matchseq: bool,
) -> Option<(i32, Vec<u32>)> {
    let mut out_score = 0i32;
    let mut all_positions = Vec::new();

    let words: Vec<&str> = if matchseq {
        if pat.is_empty() {
            return None;
        }
        vec![pat]
    } else {
        pat.split_whitespace().collect()
    };
    if words.is_empty() {
        return None;
    }

    for word in words {
        if !has_match(word, text) {
            return None;
        }
        let (fzy_score, positions) = match_positions(word, text)?;
        let score = scale_score(fzy_score);

        out_score = if score > 0 && out_score > i32::MAX - score {
            i32::MAX
        } else if score < 0 && out_score < i32::MIN + 1 - score {
            i32::MIN + 1
        } else {
            out_score.saturating_add(score)
        };

        all_positions.extend(positions);
        if all_positions.len() >= MATCH_MAX_LEN {
            break;
        }
    }

    Some((out_score, all_positions))
}

/// Score with the whole pattern matched in sequence; `None` when it doesn't
/// match. Used by completion where positions are not needed.
pub fn fuzzy_match_str(text: &str, pat: &str) -> Option<i32> {
    fuzzy_match(text, pat, true).map(|(score, _)| score)
}

/// Options for the list-matching entry points.
#[derive(Builder, Default)]
pub struct FuzzyOptions {
    /// Match multi-word patterns in sequence instead of word-by-word.
    #[builder(default)]
    pub matchseq: bool,
    /// Return at most this many items (0 = no limit).
    #[builder(default)]
    pub limit: usize,
}

/// One scored item from [`match_fuzzy_indices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzyMatched {
    /// Index into the input list.
    pub index: usize,
    pub score: i32,
    /// Matched char positions in the item's text.
    pub positions: Vec<u32>,
}

/// Fuzzy-match `pat` against every item, with `text_of` extracting the text
/// to score (items yielding `None` never match). Results are sorted by
/// descending score; ties prefer the earlier start column, then the input
/// order.
pub fn match_fuzzy_indices<T>(
    items: &[T],
    text_of: impl Fn(&T) -> Option<String>,
    pat: &str,
    opts: &FuzzyOptions,
) -> Vec<FuzzyMatched> {
    let mut matched: Vec<FuzzyMatched> = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let text = text_of(item)?;
            let (score, positions) = fuzzy_match(&text, pat, opts.matchseq)?;
            Some(FuzzyMatched { index, score, positions })
        })
        .collect();

    matched = matched
        .into_iter()
        .sorted_by_key(|m| {
            (
                std::cmp::Reverse(m.score),
                m.positions.first().copied().unwrap_or(0),
                m.index,
            )
        })
        .collect();
    if opts.limit > 0 {
        matched.truncate(opts.limit);
    }
    matched
}

/// The strings from `items` that fuzzy-match `pat`, best first.
pub fn match_fuzzy(
    items: &[&str],
    pat: &str,
    opts: &FuzzyOptions,
) -> Vec<String> {
    match_fuzzy_indices(items, |s| Some(s.to_string()), pat, opts)
        .into_iter()
        .map(|m| items[m.index].to_string())
        .collect()
}

/// Like [`match_fuzzy`] but also reports the matched positions and scores,
/// index-aligned with the returned strings.
pub fn match_fuzzy_pos(
    items: &[&str],
    pat: &str,
    opts: &FuzzyOptions,
) -> (Vec<String>, Vec<Vec<u32>>, Vec<i32>) {
    let matched = match_fuzzy_indices(items, |s| Some(s.to_string()), pat, opts);
    let strings = matched.iter().map(|m| items[m.index].to_string()).collect();
    let positions = matched.iter().map(|m| m.positions.clone()).collect();
    let scores = matched.iter().map(|m| m.score).collect();
    (strings, positions, scores)
}

fn find_word_start(line: &[u8], mut i: usize, tab: &ChartabView) -> usize {
    while i < line.len() {
        let (c, len) = decode_char(line, i);
        if tab.is_word(c) {
            break;
        }
        i += len;
    }
    i
}

fn find_word_end(line: &[u8], mut i: usize, tab: &ChartabView) -> usize {
    while i < line.len() {
        let (c, len) = decode_char(line, i);
        if !tab.is_word(c) {
            break;
        }
        i += len;
    }
    i
}

/// A match found by [`FuzzyBufferCursor::next_match`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzyLineMatch {
    /// Start of the matched word (or line in whole-line mode).
    pub pos: Pos,
    /// Byte length of the matched word/line.
    pub len: usize,
    pub score: i32,
}

/// Caller-owned cursor scanning a buffer forward for fuzzy matches,
/// word-by-word within each line, wrapping at end of file when wrap-scan is
/// enabled.
pub struct FuzzyBufferCursor<'b> {
    buf: &'b dyn LineProvider,
    pos: Pos,
    start_lnum: u32,
    wrap_scan: bool,
    /// Match whole lines instead of single words.
    whole_line: bool,
    looped: bool,
}

impl<'b> FuzzyBufferCursor<'b> {
    pub fn new(buf: &'b dyn LineProvider, start: Pos) -> Self {
        FuzzyBufferCursor {
            buf,
            pos: start,
            start_lnum: start.lnum,
            wrap_scan: true,
            whole_line: false,
            looped: false,
        }
    }

    pub fn wrap_scan(mut self, wrap: bool) -> Self {
        self.wrap_scan = wrap;
        self
    }

    pub fn whole_line(mut self, whole: bool) -> Self {
        self.whole_line = whole;
        self
    }

    fn advance_line(&mut self) -> bool {
        self.pos.lnum += 1;
        self.pos.col = 0;
        if self.pos.lnum > self.buf.max_lnum() {
            if !self.wrap_scan || self.looped {
                return false;
            }
            self.looped = true;
            self.pos.lnum = 1;
        }
        // Stop after coming around to the starting line again.
        if self.looped && self.pos.lnum > self.start_lnum {
            return false;
        }
        true
    }

    /// Find the next match at or after the cursor, advancing the cursor past
    /// it. Returns `None` when the scan is exhausted.
    pub fn next_match(&mut self, pat: &str) -> Option<FuzzyLineMatch> {
        let tab = self.buf.chartab();
        loop {
            let line = self.buf.line(self.pos.lnum);
            if self.whole_line {
                if self.pos.col == 0 && !line.is_empty() {
                    let text = String::from_utf8_lossy(line);
                    if let Some(score) = fuzzy_match_str(&text, pat) {
                        let found = FuzzyLineMatch {
                            pos: Pos::new(self.pos.lnum, 0),
                            len: line.len(),
                            score,
                        };
                        if !self.advance_line() {
                            self.pos.col = u32::MAX;
                        }
                        return Some(found);
                    }
                }
            } else {
                let mut col = self.pos.col as usize;
                while col < line.len() {
                    let start = find_word_start(line, col, tab);
                    if start >= line.len() {
                        break;
                    }
                    let end = find_word_end(line, start, tab);
                    let word = String::from_utf8_lossy(&line[start..end]);
                    if let Some(score) = fuzzy_match_str(&word, pat) {
                        self.pos.col = end as u32;
                        return Some(FuzzyLineMatch {
                            pos: Pos::new(self.pos.lnum, start as u32),
                            len: end - start,
                            score,
                        });
                    }
                    col = end;
                }
            }
            if !self.advance_line() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;

    #[test]
    fn full_match_scores_max() {
        let (score, pos) = fuzzy_match("abc", "abc", true).unwrap();
        assert_eq!(score, i32::MAX);
        assert_eq!(pos, vec![0, 1, 2]);
        // case-insensitive full match
        assert_eq!(fuzzy_match("ABC", "abc", true).unwrap().0, i32::MAX);
    }

    #[test]
    fn empty_pattern_never_matches() {
        assert_eq!(fuzzy_match("abc", "", true), None);
        assert_eq!(fuzzy_match("abc", "", false), None);
        assert_eq!(fuzzy_match("", "a", true), None);
    }

    #[test]
    fn subsequence_required() {
        assert!(fuzzy_match("hello world", "hw", false).is_some());
        assert_eq!(fuzzy_match("hello world", "wx", false), None);
    }

    #[test]
    fn camel_and_separator_bonuses() {
        // Matching at a camel-case boundary beats a mid-word match.
        let (s1, p1) = fuzzy_match("fooBar", "b", true).unwrap();
        let (s2, p2) = fuzzy_match("foobar", "b", true).unwrap();
        assert!(s1 > s2);
        assert_eq!(p1, vec![3]);
        assert_eq!(p2, vec![3]);
        // Path separator bonus beats the camel bonus.
        let (s3, _) = fuzzy_match("foo/bar", "b", true).unwrap();
        assert!(s3 > s1);
    }

    #[test]
    fn multi_word_positions() {
        let (score, pos) = fuzzy_match("FooBarBaz", "fo bz", false).unwrap();
        assert!(score > 0);
        assert_eq!(pos, vec![0, 1, 6, 8]);
    }

    #[test]
    fn matchseq_requires_order() {
        assert!(fuzzy_match("foo bar", "foo bar", true).is_some());
        assert_eq!(fuzzy_match("bar foo", "foo bar", true), None);
    }

    #[test]
    fn oversize_candidate_never_matches() {
        let long = "a".repeat(300);
        assert_eq!(fuzzy_match(&long, "aaa", true), None);
    }

    #[test]
    fn list_sorting() {
        let items = ["xbar", "foobar", "fooBar", "foo/bar"];
        let opts = FuzzyOptions::default();
        let got = match_fuzzy(&items, "b", &opts);
        // slash bonus > camel bonus > plain
        assert_eq!(got[0], "foo/bar");
        assert_eq!(got[1], "fooBar");
        // remaining ties resolve by start column, then input order
        assert_eq!(got[2], "xbar");
        assert_eq!(got[3], "foobar");
    }

    #[test]
    fn list_limit() {
        let items = ["aa", "ab", "ac"];
        let opts = FuzzyOptions::builder().limit(2).build();
        assert_eq!(match_fuzzy(&items, "a", &opts).len(), 2);
    }

    #[test]
    fn pos_lists_are_aligned() {
        let items = ["foobar", "nomatch"];
        let (strs, poss, scores) =
            match_fuzzy_pos(&items, "fb", &FuzzyOptions::default());
        assert_eq!(strs, vec!["foobar".to_string()]);
        assert_eq!(poss, vec![vec![0, 3]]);
        assert_eq!(scores.len(), 1);
    }

    #[test]
    fn buffer_cursor_scans_words() {
        let buf = Buffer::new(&["alpha beta", "gamma delta"]);
        let mut cursor = FuzzyBufferCursor::new(&buf, Pos::new(1, 0));
        let m = cursor.next_match("bt").unwrap();
        assert_eq!(m.pos, Pos::new(1, 6));
        assert_eq!(m.len, 4);
        let m = cursor.next_match("dlt").unwrap();
        assert_eq!(m.pos, Pos::new(2, 6));
        assert!(cursor.next_match("zz").is_none());
    }

    #[test]
    fn buffer_cursor_wraps() {
        let buf = Buffer::new(&["first line", "second line"]);
        let mut cursor = FuzzyBufferCursor::new(&buf, Pos::new(2, 0));
        let m = cursor.next_match("fst").unwrap();
        assert_eq!(m.pos.lnum, 1); // wrapped around

        let mut nowrap =
            FuzzyBufferCursor::new(&buf, Pos::new(2, 0)).wrap_scan(false);
        assert!(nowrap.next_match("fst").is_none());
    }

    #[test]
    fn whole_line_mode() {
        let buf = Buffer::new(&["first line", "second line"]);
        let mut cursor =
            FuzzyBufferCursor::new(&buf, Pos::new(1, 0)).whole_line(true);
        let m = cursor.next_match("scnd").unwrap();
        assert_eq!(m.pos, Pos::new(2, 0));
        assert_eq!(m.len, "second line".len());
    }
}
