//! 레이아웃 휴리스틱 - 표/수식 감지
//!
//! 추출된 페이지 평문에서 표 블록과 수식 줄을 찾아냅니다.

use std::sync::OnceLock;

use regex::Regex;

use super::TextBlock;

/// 표로 인정할 최소 열 수
const MIN_TABLE_COLUMNS: usize = 3;
/// 표로 인정할 최소 연속 행 수
const MIN_TABLE_ROWS: usize = 2;
/// 수식 후보 줄 최대 길이
const MAX_FORMULA_CHARS: usize = 160;

fn column_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\t+| {2,}").expect("valid column regex"))
}

fn math_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"[+\-*/^√∫∑∂Δαβγδεθλμνπρστφωξη≈≤≥±·×]|\b(?:sin|cos|tan|log|ln|exp|sqrt)\b|\b[A-Za-z]_[A-Za-z0-9]",
        )
        .expect("valid math regex")
    })
}

/// 줄을 열로 분리 (탭 또는 2칸 이상 공백 기준)
fn columns(line: &str) -> usize {
    column_separator()
        .split(line.trim())
        .filter(|cell| !cell.trim().is_empty())
        .count()
}

/// 표 블록 감지
///
/// 열이 3개 이상인 줄이 2줄 이상 연속되면 하나의 표로 묶습니다.
pub fn detect_tables(text: &str) -> Vec<TextBlock> {
    fn flush(rows: &mut Vec<&str>, tables: &mut Vec<TextBlock>) {
        if rows.len() >= MIN_TABLE_ROWS {
            tables.push(TextBlock {
                text: rows.join("\n"),
            });
        }
        rows.clear();
    }

    let mut tables = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if columns(line) >= MIN_TABLE_COLUMNS {
            current.push(line.trim_end());
        } else {
            flush(&mut current, &mut tables);
        }
    }
    flush(&mut current, &mut tables);

    tables
}

/// 수식 줄 감지
///
/// `=`와 수학 기호를 함께 포함하고, 산문(긴 단어 나열)이 아닌 짧은 줄을 고릅니다.
pub fn detect_formulas(text: &str) -> Vec<TextBlock> {
    text.lines()
        .map(str::trim)
        .filter(|line| is_formula_line(line))
        .map(|line| TextBlock {
            text: line.to_string(),
        })
        .collect()
}

fn is_formula_line(line: &str) -> bool {
    if line.is_empty() || line.chars().count() > MAX_FORMULA_CHARS {
        return false;
    }
    if !line.contains('=') || !math_marker().is_match(line) {
        return false;
    }

    // 4글자 이상 소문자 단어가 절반을 넘으면 산문으로 판단
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let wordy = tokens
        .iter()
        .filter(|t| t.len() >= 4 && t.chars().all(|c| c.is_ascii_lowercase()))
        .count();

    wordy * 2 <= tokens.len()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_tables() {
        let text = "Table 2. Engine data\n\
                    Engine    Thrust (kN)    Mass (kg)\n\
                    CFM56     120            2380\n\
                    LEAP-1A   143            2990\n\
                    The engines above are turbofans.";

        let tables = detect_tables(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].text.lines().count(), 3);
        assert!(tables[0].text.starts_with("Engine"));
    }

    #[test]
    fn test_single_row_is_not_a_table() {
        let text = "A    B    C\nplain sentence follows here";
        assert!(detect_tables(text).is_empty());
    }

    #[test]
    fn test_tab_separated_table() {
        let text = "Mach\tCL\tCD\n0.2\t0.45\t0.021\n0.8\t0.40\t0.035";
        assert_eq!(detect_tables(text).len(), 1);
    }

    #[test]
    fn test_detect_formulas() {
        let text = "The lift equation is given below.\n\
                    L = 0.5 * rho * V^2 * S * C_L\n\
                    where the density is measured at altitude.\n\
                    q = ½ρV²";

        let formulas = detect_formulas(text);
        assert_eq!(formulas.len(), 2);
        assert_eq!(formulas[0].text, "L = 0.5 * rho * V^2 * S * C_L");
    }

    #[test]
    fn test_prose_with_equals_is_not_formula() {
        let text = "The results were equal = within the expected tolerance - again";
        assert!(detect_formulas(text).is_empty());
    }
}
