#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    /// (mnemonic, declared length, length implied by the operand list)
    type Layout = (&'static str, usize, usize);

    macro_rules! collect_layouts {
        (
            $( $(#[$doc:meta])* $name:ident = $opcode:expr, $mnemonic:literal => [ $( $field:ident : $kind:ident ),* $(,)? ], $len:expr ),* $(,)?
        ) => {{
            let layouts: Vec<Layout> = vec![
                $(
                    (
                        $mnemonic,
                        $len,
                        1usize $( + crate::define_instructions!(@size $kind) )*,
                    ),
                )*
            ];
            layouts
        }};
    }

    fn layouts() -> Vec<Layout> {
        crate::for_each_instruction!(collect_layouts)
    }

    #[test]
    fn declared_lengths_match_operand_layout() {
        for (mnemonic, declared, implied) in layouts() {
            assert_eq!(declared, implied, "length drift in {mnemonic}");
        }
    }

    #[test]
    fn mnemonics_are_unique() {
        let mut seen = HashSet::new();
        for (mnemonic, _, _) in layouts() {
            assert!(seen.insert(mnemonic), "duplicate mnemonic {mnemonic}");
        }
    }

    #[test]
    fn max_instruction_fits_host_call() {
        let max = layouts().iter().map(|(_, len, _)| *len).max().unwrap();
        assert_eq!(max, 11);
    }
}
