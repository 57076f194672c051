//! Разбиение длинных реплик на фрагменты безопасной длины
//!
//! Движок синтеза принимает текст в параметрах запроса, поэтому слишком
//! длинный текст режется на части. Разрез предпочтительно делается на
//! знаках препинания, а при их отсутствии выполняется принудительно.

/// Длина фрагмента по умолчанию (в символах)
pub const DEFAULT_MAX_CHUNK_LEN: usize = 120;

/// Доля от максимальной длины, после которой разрешен разрез на знаке препинания
const BREAK_RATIO: f64 = 0.6;

fn is_breaker(ch: char) -> bool {
    matches!(ch, '。' | '．' | '.' | '!' | '？' | '?' | '、' | ',' | '，' | '\n')
}

/// Нормализует пробельные символы и переводы строк в одиночные пробелы
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Разбивает текст на фрагменты длиной не более `max_len` символов.
///
/// Пустой (после нормализации) текст дает пустой результат, короткий
/// текст возвращается одним фрагментом.
pub fn chunk_text(text: &str, max_len: usize) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Vec::new();
    }
    let max_len = max_len.max(1);
    if normalized.chars().count() <= max_len {
        return vec![normalized];
    }

    let soft_limit = max_len as f64 * BREAK_RATIO;
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut buf_len = 0usize;

    for ch in normalized.chars() {
        buf.push(ch);
        buf_len += 1;
        if (is_breaker(ch) && buf_len as f64 >= soft_limit) || buf_len >= max_len {
            push_trimmed(&mut chunks, &buf);
            buf.clear();
            buf_len = 0;
        }
    }
    push_trimmed(&mut chunks, &buf);

    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, buf: &str) {
    let trimmed = buf.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn empty_and_short_inputs() {
        assert!(chunk_text("", 120).is_empty());
        assert!(chunk_text("  \r\n\t ", 120).is_empty());
        assert_eq!(chunk_text("こんにちは", 120), vec!["こんにちは".to_string()]);
        assert_eq!(chunk_text("a\r\nb   c", 120), vec!["a b c".to_string()]);
    }

    #[test]
    fn splits_on_punctuation_after_soft_limit() {
        // 10 символов, лимит 10 не превышен — целиком
        assert_eq!(chunk_text("あいう。えおかきくけ", 10).len(), 1);

        let text = "あいうえおかき。くけこさしすせそたちつてと";
        let chunks = chunk_text(text, 10);
        // "。" на 8-й позиции >= 6 — разрез
        assert_eq!(chunks[0], "あいうえおかき。");
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(strip(&chunks.concat()), strip(text));
    }

    #[test]
    fn early_punctuation_does_not_split() {
        let text = "あ、いうえおかきくけこさしすせそ";
        let chunks = chunk_text(text, 10);
        // запятая слишком рано, поэтому первый фрагмент режется принудительно
        assert_eq!(chunks[0].chars().count(), 10);
        assert!(chunks[0].starts_with("あ、"));
    }

    #[test]
    fn unbreakable_run_is_force_flushed_at_max_len() {
        let text: String = std::iter::repeat('あ').take(25).collect();
        let chunks = chunk_text(&text, 10);
        assert_eq!(
            chunks.iter().map(|c| c.chars().count()).collect::<Vec<_>>(),
            vec![10, 10, 5]
        );
    }

    #[test]
    fn concatenation_reproduces_input() {
        let text = "Hello there, this is a fairly long sentence. It keeps going, and going!\n\
                    Another line? Yes. 日本語の文も混ざります。さらに続きます、まだ続きます。";
        for max_len in [5, 12, 20, 33, 64, 500] {
            let chunks = chunk_text(text, max_len);
            assert_eq!(strip(&chunks.concat()), strip(text), "max_len={}", max_len);
            assert!(chunks.iter().all(|c| c.chars().count() <= max_len));
            assert!(chunks.iter().all(|c| !c.is_empty()));
        }
    }
}
