#![no_main]

use imgsig_registry::{ImageRef, Repository};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(image) = ImageRef::parse(text) {
        // Printing and re-parsing must be stable
        let printed = image.to_string();
        let reparsed = ImageRef::parse(&printed).expect("printed reference must parse");
        assert_eq!(reparsed, image);
        assert!(Repository::parse(&image.repository().to_string()).is_ok());
    }
    let _ = Repository::parse(text);
});
