#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use super::submission::{FileEntry, StudentName};

peg::parser! {
    /// grammars for the structured values inside a submission document.
    pub grammar fields() for str {
        /// matches a single space or tab
        rule ws() = quiet!{[' ' | '\t']}

        /// matches any run of spaces or tabs
        rule inline_ws() = quiet!{[' ' | '\t']*}

        /// matches ` (ID)` when it closes the input, returns the ID
        rule id_suffix() -> &'input str
            = ws() "(" id:$((!")" [_])+) ")" ![_] { id }

        /// parses `Name(Alt) Major (ID)`, eg. `张三(Zhang San) Computer Science (12210211)`
        pub rule student_name() -> StudentName
            = name:$((!"(" [_])+)
              "(" alt:$((!")" [_])*) ")"
              ws()
              major:$((!id_suffix() [_])+)
              id:id_suffix()
            { StudentName::new(name, alt, major, id) }

        /// matches the rest of a line, trimmed
        rule value() -> &'input str
            = v:$((!['\n'] [_])*) { v.trim() }

        /// parses one attachment block of the `Files` field:
        /// `Original filename: X` followed by `Filename: Y`, extra lines ignored
        pub rule file_block() -> FileEntry
            = inline_ws() "Original filename" inline_ws() ":" original:value() "\n"
              inline_ws() "Filename" inline_ws() ":" stored:value()
              ("\n" [_]*)?
            {?
                if original.is_empty() || stored.is_empty() {
                    Err("non-empty filenames")
                } else {
                    Ok(FileEntry::new(original, stored))
                }
            }
    }
}
