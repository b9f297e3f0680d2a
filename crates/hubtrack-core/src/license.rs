//! License detection from license file contents
//!
//! Matches characteristic phrases of common open source licenses and
//! returns the SPDX identifier of the first match. More specific licenses
//! are checked before the ones whose text they embed (LGPL before GPL,
//! BSD-3-Clause before BSD-2-Clause).

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

struct Rule {
    spdx: &'static str,
    all: &'static [&'static str],
}

const RULES: &[Rule] = &[
    Rule {
        spdx: "AGPL-3.0",
        all: &["gnu affero general public license", "version 3"],
    },
    Rule {
        spdx: "LGPL-3.0",
        all: &["gnu lesser general public license", "version 3"],
    },
    Rule {
        spdx: "LGPL-2.1",
        all: &["gnu lesser general public license", "version 2.1"],
    },
    Rule {
        spdx: "GPL-3.0",
        all: &["gnu general public license", "version 3"],
    },
    Rule {
        spdx: "GPL-2.0",
        all: &["gnu general public license", "version 2"],
    },
    Rule {
        spdx: "Apache-2.0",
        all: &["apache license", "version 2.0"],
    },
    Rule {
        spdx: "MPL-2.0",
        all: &["mozilla public license", "2.0"],
    },
    Rule {
        spdx: "EPL-2.0",
        all: &["eclipse public license", "2.0"],
    },
    Rule {
        spdx: "BSD-3-Clause",
        all: &[
            "redistribution and use in source and binary forms",
            "neither the name of",
        ],
    },
    Rule {
        spdx: "BSD-2-Clause",
        all: &["redistribution and use in source and binary forms"],
    },
    Rule {
        spdx: "MIT",
        all: &[
            "permission is hereby granted, free of charge, to any person obtaining a copy",
        ],
    },
    Rule {
        spdx: "ISC",
        all: &["permission to use, copy, modify, and/or distribute this software for any purpose"],
    },
    Rule {
        spdx: "Unlicense",
        all: &["this is free and unencumbered software released into the public domain"],
    },
];

/// Detect the SPDX identifier of the license in `data`
pub fn detect(data: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(data).to_lowercase();
    let text = WHITESPACE_RE.replace_all(&text, " ");

    RULES
        .iter()
        .find(|rule| rule.all.iter().all(|phrase| text.contains(phrase)))
        .map(|rule| rule.spdx.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_apache() {
        let text = "
                                 Apache License
                           Version 2.0, January 2004
                        http://www.apache.org/licenses/
        ";
        assert_eq!(detect(text.as_bytes()), Some("Apache-2.0".to_string()));
    }

    #[test]
    fn test_detect_mit() {
        let text = "MIT License\n\nCopyright (c) 2020 Someone\n\nPermission is hereby granted, free of charge, to any person obtaining a copy\nof this software";
        assert_eq!(detect(text.as_bytes()), Some("MIT".to_string()));
    }

    #[test]
    fn test_detect_gpl_family() {
        let lgpl = "GNU LESSER GENERAL PUBLIC LICENSE\n Version 3, 29 June 2007";
        assert_eq!(detect(lgpl.as_bytes()), Some("LGPL-3.0".to_string()));

        let gpl = "GNU GENERAL PUBLIC LICENSE\nVersion 2, June 1991";
        assert_eq!(detect(gpl.as_bytes()), Some("GPL-2.0".to_string()));
    }

    #[test]
    fn test_detect_bsd() {
        let bsd3 = "Redistribution and use in source and binary\nforms, with or without modification... Neither the name of the copyright holder";
        assert_eq!(detect(bsd3.as_bytes()), Some("BSD-3-Clause".to_string()));
    }

    #[test]
    fn test_detect_unknown() {
        assert_eq!(detect(b"All rights reserved."), None);
        assert_eq!(detect(b""), None);
    }
}
