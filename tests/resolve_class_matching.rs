use homeroomd::resolve::{resolve_class, ClassRef};

fn classes() -> Vec<ClassRef> {
    vec![
        ClassRef {
            id: "1".to_string(),
            name: "English-1".to_string(),
        },
        ClassRef {
            id: "2".to_string(),
            name: "French-1".to_string(),
        },
        ClassRef {
            id: "3".to_string(),
            name: "English-2".to_string(),
        },
    ]
}

#[test]
fn general_aliases_mean_unscoped() {
    let classes = classes();
    for input in ["", "  ", "general", "gen", "g", "GENERAL"] {
        assert_eq!(resolve_class(input, &classes), None, "input {:?}", input);
    }
}

#[test]
fn exact_match_beats_prefix() {
    let classes = vec![
        ClassRef {
            id: "a".to_string(),
            name: "Art".to_string(),
        },
        ClassRef {
            id: "b".to_string(),
            name: "Ar".to_string(),
        },
    ];
    assert_eq!(resolve_class("ar", &classes), Some("b".to_string()));
}

#[test]
fn prefix_match_is_case_insensitive() {
    let classes = classes();
    assert_eq!(resolve_class("english-1", &classes), Some("1".to_string()));
    assert_eq!(resolve_class("ENGLISH-2", &classes), Some("3".to_string()));
    assert_eq!(resolve_class("fren", &classes), Some("2".to_string()));
}

#[test]
fn letter_digit_abbreviations() {
    let classes = classes();
    assert_eq!(resolve_class("e1", &classes), Some("1".to_string()));
    assert_eq!(resolve_class("f1", &classes), Some("2".to_string()));
    assert_eq!(resolve_class("e2", &classes), Some("3".to_string()));
    // unknown digit falls through all rules
    assert_eq!(resolve_class("e9", &classes), None);
}

#[test]
fn substring_match_is_the_last_resort() {
    let classes = classes();
    assert_eq!(resolve_class("rench", &classes), Some("2".to_string()));
    assert_eq!(resolve_class("nothing", &classes), None);
}

#[test]
fn empty_class_list_never_matches() {
    assert_eq!(resolve_class("e1", &[]), None);
}
