//! ISO 639-1 language codes accepted in the `language` column.

/// The mandatory language of every term.
pub const ENGLISH: &str = "en";

/// Two-letter ISO 639-1 codes, sorted for binary search.
const ISO_639_1: &[&str] = &[
  "aa", "ab", "ae", "af", "ak", "am", "an", "ar", "as", "av", "ay", "az",
  "ba", "be", "bg", "bh", "bi", "bm", "bn", "bo", "br", "bs", "ca", "ce",
  "ch", "co", "cr", "cs", "cu", "cv", "cy", "da", "de", "dv", "dz", "ee",
  "el", "en", "eo", "es", "et", "eu", "fa", "ff", "fi", "fj", "fo", "fr",
  "fy", "ga", "gd", "gl", "gn", "gu", "gv", "ha", "he", "hi", "ho", "hr",
  "ht", "hu", "hy", "hz", "ia", "id", "ie", "ig", "ii", "ik", "io", "is",
  "it", "iu", "ja", "jv", "ka", "kg", "ki", "kj", "kk", "kl", "km", "kn",
  "ko", "kr", "ks", "ku", "kv", "kw", "ky", "la", "lb", "lg", "li", "ln",
  "lo", "lt", "lu", "lv", "mg", "mh", "mi", "mk", "ml", "mn", "mr", "ms",
  "mt", "my", "na", "nb", "nd", "ne", "ng", "nl", "nn", "no", "nr", "nv",
  "ny", "oc", "oj", "om", "or", "os", "pa", "pi", "pl", "ps", "pt", "qu",
  "rm", "rn", "ro", "ru", "rw", "sa", "sc", "sd", "se", "sg", "si", "sk",
  "sl", "sm", "sn", "so", "sq", "sr", "ss", "st", "su", "sv", "sw", "ta",
  "te", "tg", "th", "ti", "tk", "tl", "tn", "to", "tr", "ts", "tt", "tw",
  "ty", "ug", "uk", "ur", "uz", "ve", "vi", "vo", "wa", "wo", "xh", "yi",
  "yo", "za", "zh", "zu",
];

/// Returns true if `code` is a lowercase ISO 639-1 code.
pub fn is_known(code: &str) -> bool { ISO_639_1.binary_search(&code).is_ok() }

/// Map an RDF language tag (`en`, `en-GB`, `FR`, …) onto a table language.
///
/// Untagged literals count as English. Tags whose primary subtag is not a
/// known two-letter code yield `None`.
pub fn from_tag(tag: Option<&str>) -> Option<String> {
  let Some(tag) = tag else {
    return Some(ENGLISH.to_owned());
  };
  let primary = tag.split(['-', '_']).next().unwrap_or(tag).to_ascii_lowercase();
  is_known(&primary).then_some(primary)
}
