//! The shared session. Kept to a single test: the peer belongs to the
//! thread that started it.

use std::path::Path;

use procbridge_session::{global, SessionConfig, DEFAULT_INTERPRETER};

#[test]
fn test_global_session_lifecycle() {
    if !Path::new(DEFAULT_INTERPRETER).exists() {
        eprintln!("skipping: {} not found", DEFAULT_INTERPRETER);
        return;
    }

    assert!(!global::is_initialized());
    let total: i64 = global::call("sum", (vec![1i64, 2, 3, 4, 5],)).unwrap();
    assert_eq!(total, 15);
    assert!(global::is_initialized());

    global::set_vars(&["greeting"], ("hi",)).unwrap();
    global::run("greeting = greeting * 2").unwrap();
    let greeting: String = global::eval("greeting").unwrap();
    assert_eq!(greeting, "hihi");

    // A fresh session forgets earlier definitions.
    global::init(SessionConfig::default()).unwrap();
    let defined: i64 = global::exec("", "int('greeting' in globals())").unwrap();
    assert_eq!(defined, 0);

    let pid = global::with_session(|session| Ok(session.pid())).unwrap();
    assert!(pid > 0);

    global::shutdown().unwrap();
    assert!(!global::is_initialized());
}
