//! Text helpers shared by the normalization pipeline

/// Returns the longest common substring of the given strings
///
/// The shortest input is used as the reference; every slice of it that is
/// longer than the current best is tested against all inputs. Quadratic in
/// the reference length, which is fine for episode-title-sized inputs.
pub fn longest_substr(strings: &[&str]) -> String {
    let mut substr = String::new();

    let Some(reference) = strings.iter().min_by_key(|s| s.len()) else {
        return substr;
    };

    // Work on char boundaries so multi-byte titles don't panic on slicing
    let chars: Vec<char> = reference.chars().collect();
    let length = chars.len();

    for i in 0..length {
        for j in (i + substr.chars().count() + 1)..=length {
            let candidate: String = chars[i..j].iter().collect();
            if strings.iter().all(|text| text.contains(&candidate)) {
                substr = candidate;
            }
        }
    }

    substr
}
