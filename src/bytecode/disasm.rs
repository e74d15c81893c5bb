use crate::bytecode::ir::Program;

/// Render a program as a numbered listing, one instruction per line.
///
/// This is a diagnostic surface, not a wire format; [`crate::bytecode::image`]
/// is the machine-readable encoding.
pub fn render(program: &Program) -> String {
    let mut out = String::new();
    for (i, op) in program.iter().enumerate() {
        out.push_str(&format!("{}:\t\t| {}\n", i, op));
    }
    out
}

/// Print the listing to stdout.
pub fn print(program: &Program) {
    print!("{}", render(program));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::{Op, Operand};

    #[test]
    fn test_listing_shape() {
        let program: Program = vec![
            Op::VarInt("a".to_string()),
            Op::PushInt(Operand::Int(5)),
            Op::PopInt("a".to_string()),
            Op::Exit,
        ]
        .into_iter()
        .collect();

        let listing = render(&program);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "0:\t\t|     vari a");
        assert_eq!(lines[1], "1:\t\t|     pushi 5");
        assert_eq!(lines[3], "3:\t\t|     exit");
    }

    #[test]
    fn test_function_lines_flush_left() {
        let program: Program = vec![
            Op::StartFunc("f".to_string()),
            Op::Return,
            Op::EndFunc,
        ]
        .into_iter()
        .collect();

        let listing = render(&program);
        assert!(listing.contains("| FUNC @f:"));
        assert!(listing.contains("|     ret"));
        assert!(listing.contains("| ENDFUNC"));
    }

    #[test]
    fn test_every_line_starts_with_its_index() {
        let program: Program = vec![Op::Print, Op::Exit].into_iter().collect();
        for (i, line) in render(&program).lines().enumerate() {
            assert!(line.starts_with(&format!("{}:", i)));
        }
    }
}
