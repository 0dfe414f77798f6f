use super::{validate, ObjectPath};

#[test]
fn path_grammar() {
    assert!(validate(b"/"));
    assert!(validate(b"/foo"));
    assert!(validate(b"/foo/bar_2"));
    assert!(!validate(b""));
    assert!(!validate(b"foo"));
    assert!(!validate(b"/foo/"));
    assert!(!validate(b"//foo"));
    assert!(!validate(b"/foo//bar"));
    assert!(!validate(b"/foo-bar"));
    assert!(!validate(b"/foo\0"));
}

#[test]
fn canonicalize() {
    assert_eq!(ObjectPath::canonicalize("").unwrap().as_str(), "/");
    assert_eq!(ObjectPath::canonicalize("/").unwrap().as_str(), "/");
    assert_eq!(ObjectPath::canonicalize("a/b").unwrap().as_str(), "/a/b");
    assert_eq!(
        ObjectPath::canonicalize("//a//b/").unwrap().as_str(),
        "/a/b"
    );
    assert!(ObjectPath::canonicalize("/a.b").is_err());

    // Idempotent.
    let once = ObjectPath::canonicalize("//a//b/").unwrap();
    let twice = ObjectPath::canonicalize(once.as_str()).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn parent_and_tail() {
    let path = ObjectPath::new("/foo/bar").unwrap();
    assert_eq!(path.parent().unwrap().as_str(), "/foo");
    assert_eq!(path.tail(), "bar");

    let top = ObjectPath::new("/foo").unwrap();
    assert_eq!(top.parent().unwrap().as_str(), "/");
    assert_eq!(top.tail(), "foo");

    assert!(ObjectPath::ROOT.parent().is_none());
}
