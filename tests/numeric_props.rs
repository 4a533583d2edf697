use proptest::prelude::*;

use wami::numeric;
use wami::{FunctionBody, FunctionType, Instance, Instruction, Machine, OpCode, ValType, Value};

fn unary_fn(param: ValType, result: ValType, ops: &[OpCode]) -> Instance {
    let mut body = vec![Instruction::with_operands(OpCode::LocalGet, &[0])];
    body.extend(ops.iter().map(|&o| Instruction::new(o)));
    body.push(Instruction::new(OpCode::End));
    let mut inst = Instance::new();
    inst.types.push(FunctionType::new(vec![param], vec![result]));
    inst.add_function(0, FunctionBody::new(body, vec![]));
    inst
}

fn run1(inst: &Instance, arg: Value) -> Value {
    Machine::new(inst)
        .call(0, &[arg], true)
        .expect("call trapped")
        .expect("no results")[0]
}

proptest! {
    #[test]
    fn f32_reinterpret_round_trips_all_bit_patterns(bits: u32) {
        let inst = unary_fn(
            ValType::I32,
            ValType::I32,
            &[OpCode::F32ReinterpretI32, OpCode::I32ReinterpretF32],
        );
        prop_assert_eq!(run1(&inst, Value::from_u32(bits)).as_u32(), bits);
    }

    #[test]
    fn f64_reinterpret_round_trips_all_bit_patterns(bits: u64) {
        let inst = unary_fn(
            ValType::I64,
            ValType::I64,
            &[OpCode::F64ReinterpretI64, OpCode::I64ReinterpretF64],
        );
        prop_assert_eq!(run1(&inst, Value::from_u64(bits)).as_u64(), bits);
    }

    #[test]
    fn trunc_sat_clamps_into_domain(v: f64) {
        let inst = unary_fn(ValType::F64, ValType::I32, &[OpCode::I32TruncSatF64S]);
        let got = run1(&inst, Value::from_f64(v)).as_i32();
        let expected = if v.is_nan() {
            0
        } else if v <= i32::MIN as f64 {
            i32::MIN
        } else if v >= i32::MAX as f64 {
            i32::MAX
        } else {
            v as i32
        };
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn trapping_trunc_agrees_with_sat_inside_the_domain(v in -2.0e9f64..2.0e9f64) {
        // where the trapping form succeeds the two must agree
        if let Ok(exact) = numeric::i32_trunc_f64(v) {
            prop_assert_eq!(exact, v as i32);
        }
    }

    #[test]
    fn neg_is_an_involution_on_bits(bits: u64) {
        let v = f64::from_bits(bits);
        prop_assert_eq!(numeric::f64_neg(numeric::f64_neg(v)).to_bits(), bits);
    }

    #[test]
    fn copysign_only_changes_the_sign_bit(mag: u64, sign: u64) {
        let out = numeric::f64_copysign(f64::from_bits(mag), f64::from_bits(sign)).to_bits();
        prop_assert_eq!(out & !(1 << 63), mag & !(1 << 63));
        prop_assert_eq!(out >> 63, sign >> 63);
    }

    #[test]
    fn add_matches_twos_complement_wrapping(a: i32, b: i32) {
        let mut inst = Instance::new();
        inst.types.push(FunctionType::new(
            vec![ValType::I32, ValType::I32],
            vec![ValType::I32],
        ));
        inst.add_function(
            0,
            FunctionBody::new(
                vec![
                    Instruction::with_operands(OpCode::LocalGet, &[0]),
                    Instruction::with_operands(OpCode::LocalGet, &[1]),
                    Instruction::new(OpCode::I32Add),
                    Instruction::new(OpCode::End),
                ],
                vec![],
            ),
        );
        let got = Machine::new(&inst)
            .call(0, &[Value::from_i32(a), Value::from_i32(b)], true)
            .unwrap()
            .unwrap()[0]
            .as_i32();
        prop_assert_eq!(got, a.wrapping_add(b));
    }

    #[test]
    fn rotl_then_rotr_is_identity(v: u32, by in 0u32..128) {
        let mut inst = Instance::new();
        inst.types.push(FunctionType::new(vec![ValType::I32], vec![ValType::I32]));
        inst.add_function(
            0,
            FunctionBody::new(
                vec![
                    Instruction::with_operands(OpCode::LocalGet, &[0]),
                    Instruction::with_operands(OpCode::I32Const, &[by as u64]),
                    Instruction::new(OpCode::I32Rotl),
                    Instruction::with_operands(OpCode::I32Const, &[by as u64]),
                    Instruction::new(OpCode::I32Rotr),
                    Instruction::new(OpCode::End),
                ],
                vec![],
            ),
        );
        prop_assert_eq!(run1(&inst, Value::from_u32(v)).as_u32(), v);
    }

    #[test]
    fn min_max_partition_non_nan_pairs(a: f64, b: f64) {
        prop_assume!(!a.is_nan() && !b.is_nan());
        let lo = numeric::f64_min(a, b);
        let hi = numeric::f64_max(a, b);
        prop_assert!(lo <= hi);
        prop_assert!((lo == a && hi == b) || (lo == b && hi == a));
    }
}
