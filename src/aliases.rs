//! Static table of formal first names and their informal variants.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Formal name followed by the informal forms drivers are commonly logged under.
const NICKNAMES: &[(&str, &[&str])] = &[
    ("alexander", &["alex", "al", "sandy"]),
    ("andrew", &["andy", "drew"]),
    ("anthony", &["tony"]),
    ("benjamin", &["ben", "benny"]),
    ("bradley", &["brad"]),
    ("cameron", &["cam"]),
    ("charles", &["charlie", "chuck", "chas"]),
    ("christopher", &["chris", "kit"]),
    ("daniel", &["dan", "danny"]),
    ("david", &["dave", "davy"]),
    ("donald", &["don", "donnie"]),
    ("douglas", &["doug"]),
    ("edward", &["ed", "eddie", "ted"]),
    ("elizabeth", &["liz", "beth", "betty", "lizzie"]),
    ("frederick", &["fred", "freddie"]),
    ("gregory", &["greg"]),
    ("jacob", &["jake"]),
    ("james", &["jim", "jimmy", "jamie"]),
    ("jennifer", &["jen", "jenny"]),
    ("jeffrey", &["jeff"]),
    ("jonathan", &["jon", "jonny"]),
    ("joseph", &["joe", "joey"]),
    ("joshua", &["josh"]),
    ("katherine", &["kate", "kathy", "katie"]),
    ("kenneth", &["ken", "kenny"]),
    ("lawrence", &["larry", "laurie"]),
    ("margaret", &["maggie", "meg", "peggy"]),
    ("matthew", &["matt"]),
    ("michael", &["mike", "mick", "mikey"]),
    ("nicholas", &["nick", "nicky"]),
    ("patrick", &["pat", "paddy"]),
    ("peter", &["pete"]),
    ("phillip", &["phil"]),
    ("raymond", &["ray"]),
    ("rebecca", &["becky", "bec"]),
    ("richard", &["rick", "rich", "dick", "ricky"]),
    ("robert", &["rob", "bob", "bobby", "robbie"]),
    ("ronald", &["ron", "ronnie"]),
    ("samuel", &["sam", "sammy"]),
    ("stephen", &["steve", "stevie"]),
    ("steven", &["steve", "stevie"]),
    ("susan", &["sue", "suzie"]),
    ("terence", &["terry"]),
    ("thomas", &["tom", "tommy"]),
    ("timothy", &["tim", "timmy"]),
    ("william", &["bill", "will", "billy", "liam"]),
];

static FORMAL_TO_INFORMAL: LazyLock<HashMap<&'static str, &'static [&'static str]>> =
    LazyLock::new(|| NICKNAMES.iter().copied().collect());

/// Informal variants recorded for a normalized formal name.
pub fn informal_variants(formal: &str) -> &'static [&'static str] {
    FORMAL_TO_INFORMAL.get(formal).copied().unwrap_or(&[])
}

/// Whether `a` and `b` are a formal/informal pair, in either direction.
pub fn are_aliases(a: &str, b: &str) -> bool {
    a != b && (informal_variants(a).contains(&b) || informal_variants(b).contains(&a))
}

/// Whether two tokenized names are the same name modulo nicknames.
///
/// Tokens are compared position by position; each pair must be equal or an
/// alias pair, and at least one pair must be an alias pair.
pub fn names_equivalent<A, B>(a: &[A], b: &[B]) -> bool
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    if a.len() != b.len() || a.is_empty() {
        return false;
    }
    let mut substituted = false;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (x.as_ref(), y.as_ref());
        if x == y {
            continue;
        }
        if are_aliases(x, y) {
            substituted = true;
        } else {
            return false;
        }
    }
    substituted
}
