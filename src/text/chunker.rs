//! Модуль для разбиения длинных реплик на фрагменты
//!
//! Синтезаторы плохо переносят длинный текст, поэтому реплика длиннее
//! `max_len` символов делится на фрагменты, каждый из которых синтезируется
//! отдельно. Граница выбирается по приоритету: конец предложения, затем
//! запятая или тире, затем пробел. Длина считается в символах, а не в байтах.

/// Класс разделителей, по которым режется текст
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelimiterClass {
    /// Конец предложения: `. ? ! …`
    Sentence,
    /// Граница фразы: запятая, точка с запятой, тире
    Clause,
    /// Любой пробельный символ
    Whitespace,
}

impl DelimiterClass {
    /// Классы в порядке убывания приоритета
    pub const PRIORITY: [DelimiterClass; 3] = [
        DelimiterClass::Sentence,
        DelimiterClass::Clause,
        DelimiterClass::Whitespace,
    ];

    /// Является ли символ разделителем этого класса
    pub fn matches(&self, c: char) -> bool {
        match self {
            Self::Sentence => matches!(c, '.' | '?' | '!' | '…'),
            Self::Clause => matches!(c, ',' | ';' | '-' | '–' | '—'),
            Self::Whitespace => c.is_whitespace(),
        }
    }

    /// Есть ли в тексте хотя бы один разделитель этого класса
    pub fn present_in(&self, text: &str) -> bool {
        text.chars().any(|c| self.matches(c))
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Разбивает текст на упорядоченные фрагменты длиной не более `max_len` символов.
///
/// Текст, который и так помещается в лимит, возвращается без изменений.
/// Пустой текст или текст из одних пробелов дает пустой список.
/// Между объединенными единицами вставляется ровно один пробел.
pub fn split_text(text: &str, max_len: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let max_len = max_len.max(1);
    if char_len(text) <= max_len {
        return vec![text.to_string()];
    }

    let units = match DelimiterClass::PRIORITY
        .iter()
        .position(|class| class.present_in(text))
    {
        Some(level) => split_units(text, level, max_len),
        None => hard_slice(text.trim(), max_len),
    };

    pack_units(units, max_len)
}

/// Делит текст по классу `level`, дробя слишком длинные единицы
/// следующими по приоритету классами.
fn split_units(text: &str, level: usize, max_len: usize) -> Vec<String> {
    let class = DelimiterClass::PRIORITY[level];
    let mut result = Vec::new();

    for unit in split_keeping_delimiters(text, class) {
        if char_len(&unit) <= max_len {
            result.push(unit);
            continue;
        }

        let lower = DelimiterClass::PRIORITY
            .iter()
            .enumerate()
            .skip(level + 1)
            .find(|(_, class)| class.present_in(&unit))
            .map(|(index, _)| index);

        match lower {
            Some(next_level) => result.extend(split_units(&unit, next_level, max_len)),
            None => result.extend(hard_slice(&unit, max_len)),
        }
    }

    result
}

/// Режет текст после каждой серии разделителей, оставляя разделитель
/// в конце единицы, к которой он относится. Единицы обрезаются по краям,
/// пустые отбрасываются.
fn split_keeping_delimiters(text: &str, class: DelimiterClass) -> Vec<String> {
    let mut units = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if class.matches(c) && !chars.peek().map_or(false, |next| class.matches(*next)) {
            push_trimmed(&mut units, &current);
            current.clear();
        }
    }
    push_trimmed(&mut units, &current);

    units
}

fn push_trimmed(units: &mut Vec<String>, unit: &str) {
    let trimmed = unit.trim();
    if !trimmed.is_empty() {
        units.push(trimmed.to_string());
    }
}

/// Последний вариант: режет текст на куски фиксированной длины
fn hard_slice(text: &str, max_len: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_len)
        .map(|piece| piece.iter().collect::<String>())
        .filter(|piece| !piece.trim().is_empty())
        .collect()
}

/// Жадно собирает единицы во фрагменты, не превышая `max_len`
fn pack_units(units: Vec<String>, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for unit in units {
        let unit_len = char_len(&unit);
        if current.is_empty() {
            current = unit;
            current_len = unit_len;
        } else if current_len + 1 + unit_len <= max_len {
            current.push(' ');
            current.push_str(&unit);
            current_len += 1 + unit_len;
        } else {
            chunks.push(std::mem::take(&mut current));
            current = unit;
            current_len = unit_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn without_whitespace(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    fn assert_invariants(text: &str, max_len: usize) -> Vec<String> {
        let chunks = split_text(text, max_len);
        for chunk in &chunks {
            assert!(
                chunk.chars().count() <= max_len,
                "Фрагмент {:?} длиннее {} символов",
                chunk,
                max_len
            );
        }
        assert_eq!(
            without_whitespace(&chunks.concat()),
            without_whitespace(text),
            "Содержимое должно сохраняться в исходном порядке"
        );
        chunks
    }

    #[test]
    fn test_short_text_is_returned_unchanged() {
        let text = "  Krótka kwestia.  ";
        assert_eq!(split_text(text, 200), vec![text.to_string()]);
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        assert!(split_text("", 20).is_empty());
        assert!(split_text("   \t\n ", 20).is_empty());
    }

    #[test]
    fn test_sentence_then_clause_split() {
        let text = "Zdanie jedno. Zdanie dwa, które jest dłuższe.";
        let chunks = assert_invariants(text, 20);
        assert_eq!(
            chunks,
            vec![
                "Zdanie jedno.".to_string(),
                "Zdanie dwa,".to_string(),
                "które jest dłuższe.".to_string(),
            ]
        );
    }

    #[test]
    fn test_units_are_packed_greedily() {
        let text = "Tak. Nie. Może. Chyba tak.";
        let chunks = assert_invariants(text, 12);
        assert_eq!(chunks, vec!["Tak. Nie.", "Może.", "Chyba tak."]);
    }

    #[test]
    fn test_clause_class_used_when_no_sentence_end() {
        let text = "pierwsza część, druga część, trzecia część";
        let chunks = assert_invariants(text, 30);
        assert_eq!(chunks, vec!["pierwsza część, druga część,", "trzecia część"]);
    }

    #[test]
    fn test_whitespace_fallback_and_hard_slice() {
        let text = "abcdefghijklmnopqrstuvwxyz abc";
        let chunks = assert_invariants(text, 10);
        assert_eq!(chunks, vec!["abcdefghij", "klmnopqrst", "uvwxyz abc"]);
    }

    #[test]
    fn test_text_without_any_delimiter_is_sliced() {
        let chunks = assert_invariants("ąęćłńóśźżąęćłńóśźż", 5);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0], "ąęćłń");
    }

    #[test]
    fn test_delimiter_runs_stay_together() {
        let text = "Czekaj... Co?! Naprawdę tak myślisz?";
        let chunks = assert_invariants(text, 15);
        assert_eq!(chunks[0], "Czekaj... Co?!");
    }

    #[test]
    fn test_invariants_over_mixed_inputs() {
        let texts = [
            "Witaj, wędrowcze! Droga do miasta jest długa — uważaj na wilki, bandytów i pogodę. Czy chcesz iść dalej?",
            "Bardzo-długie-słowo-z-myślnikami-które-nie-ma-spacji-ani-kropek",
            "… … …   tylko kropki… i   spacje",
            "a b c d e f g h i j k l m n o p q r s t u v w x y z",
        ];
        for text in texts {
            for max_len in [1, 3, 7, 16, 40, 500] {
                assert_invariants(text, max_len);
            }
        }
    }
}
