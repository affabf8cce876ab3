use whatlang::Lang;

/// ISO 639-1 tag for a post's language, or `None` when detection is not
/// confident (very short posts, numbers, emoji).
pub fn detect(text: &str) -> Option<&'static str> {
    let info = whatlang::detect(text)?;
    if !info.is_reliable() {
        return None;
    }
    iso_639_1(info.lang())
}

fn iso_639_1(lang: Lang) -> Option<&'static str> {
    let tag = match lang {
        Lang::Eng => "en",
        Lang::Fra => "fr",
        Lang::Deu => "de",
        Lang::Spa => "es",
        Lang::Por => "pt",
        Lang::Ita => "it",
        Lang::Nld => "nl",
        Lang::Swe => "sv",
        Lang::Dan => "da",
        Lang::Nob => "no",
        Lang::Fin => "fi",
        Lang::Pol => "pl",
        Lang::Ces => "cs",
        Lang::Hun => "hu",
        Lang::Ron => "ro",
        Lang::Tur => "tr",
        Lang::Rus => "ru",
        Lang::Ukr => "uk",
        Lang::Bul => "bg",
        Lang::Ell => "el",
        Lang::Ara => "ar",
        Lang::Heb => "he",
        Lang::Hin => "hi",
        Lang::Tha => "th",
        Lang::Vie => "vi",
        Lang::Ind => "id",
        Lang::Cmn => "zh",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        _ => return None,
    };
    Some(tag)
}

#[cfg(test)]
mod tests {
    use super::detect;

    #[test]
    fn latin_script_languages() {
        assert_eq!(
            detect("The quick brown fox jumps over the lazy dog and then runs back into the forest to sleep."),
            Some("en")
        );
        assert_eq!(
            detect("Bonjour tout le monde, je suis très heureux de vous voir aujourd'hui dans cette belle ville."),
            Some("fr")
        );
        assert_eq!(
            detect("Guten Morgen, ich hoffe, dass es dir heute gut geht und du einen schönen Tag hast."),
            Some("de")
        );
    }

    #[test]
    fn other_scripts() {
        assert_eq!(detect("你好，世界"), Some("zh"));
        assert_eq!(detect("今日はいい天気です"), Some("ja"));
        assert_eq!(detect("안녕하세요"), Some("ko"));
        assert_eq!(
            detect("Привет всем! Сегодня очень хорошая погода, и мы идём гулять в парк с друзьями."),
            Some("ru")
        );
    }

    #[test]
    fn nothing_to_detect() {
        assert_eq!(detect("1234 !!"), None);
        assert_eq!(detect(""), None);
    }
}
