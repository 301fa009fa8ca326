//! Integration coverage for the named scenarios and quantified properties:
//! each test builds a JSON fixture, loads it, and checks the evaluated
//! results against the documented expectation.

use correctionlib_core::{Argument, CorrectionSet, LoaderOptions};
use serde_json::json;

fn load(value: serde_json::Value) -> CorrectionSet {
    CorrectionSet::from_json_default(&value).expect("fixture should load")
}

fn eval1(set: &CorrectionSet, name: &str, args: Vec<Argument>) -> f64 {
    correctionlib_core::evaluate(set.by_name(name).unwrap(), &args).unwrap()
}

// S1 pt weight: binning with clamp flow.
#[test]
fn s1_pt_weight_clamp() {
    let set = load(json!({
        "schema_version": 2,
        "corrections": [{
            "name": "pt_weight",
            "version": 1,
            "inputs": [{"name": "pt", "type": "real"}],
            "output": {"name": "weight", "type": "real"},
            "data": {
                "nodetype": "binning",
                "input": "pt",
                "edges": [10.0, 20.0, 30.0, 40.0, 50.0, 80.0, 120.0],
                "content": [1.1, 1.08, 1.06, 1.04, 1.02, 1.0],
                "flow": "clamp"
            }
        }]
    }));
    assert_eq!(eval1(&set, "pt_weight", vec![Argument::Real(1.2)]), 1.1);
    assert_eq!(eval1(&set, "pt_weight", vec![Argument::Real(1000.0)]), 1.0);
}

// S2 binning error flow: both below-range and at-the-high-edge (exclusive) fail.
#[test]
fn s2_binning_error_flow() {
    let set = load(json!({
        "schema_version": 2,
        "corrections": [{
            "name": "pt_weight",
            "version": 1,
            "inputs": [{"name": "pt", "type": "real"}],
            "output": {"name": "weight", "type": "real"},
            "data": {
                "nodetype": "binning",
                "input": "pt",
                "edges": [10.0, 20.0, 30.0, 40.0, 50.0, 80.0, 120.0],
                "content": [1.1, 1.08, 1.06, 1.04, 1.02, 1.0],
                "flow": "error"
            }
        }]
    }));
    let corr = set.by_name("pt_weight").unwrap();
    assert!(correctionlib_core::evaluate(corr, &[Argument::Real(5.0)]).is_err());
    assert!(correctionlib_core::evaluate(corr, &[Argument::Real(120.0)]).is_err());
}

// S3 category default.
#[test]
fn s3_category_default() {
    let set = load(json!({
        "schema_version": 2,
        "corrections": [{
            "name": "syst_weight",
            "version": 1,
            "inputs": [{"name": "syst", "type": "string"}],
            "output": {"name": "weight", "type": "real"},
            "data": {
                "nodetype": "category",
                "input": "syst",
                "content": [
                    {"key": "blah", "value": 1.2},
                    {"key": "def", "value": 0.0}
                ],
                "default": 0.0
            }
        }]
    }));
    assert_eq!(eval1(&set, "syst_weight", vec![Argument::String("blah".into())]), 1.2);
    assert_eq!(eval1(&set, "syst_weight", vec![Argument::String("other".into())]), 0.0);
}

// S4 formula, covered more thoroughly in correctionlib-formula, exercised
// here through the full loader/evaluator path.
#[test]
fn s4_formula_through_loader() {
    let set = load(json!({
        "schema_version": 2,
        "corrections": [{
            "name": "f",
            "version": 1,
            "inputs": [{"name": "x", "type": "real"}],
            "output": {"name": "y", "type": "real"},
            "data": {
                "nodetype": "formula",
                "parser": "TFormula",
                "expression": "0.25*x + exp([0])",
                "variables": ["x"],
                "parameters": [3.1]
            }
        }]
    }));
    let expected = 0.25 * 31.0 + 3.1_f64.exp();
    assert!((eval1(&set, "f", vec![Argument::Real(31.0)]) - expected).abs() < 1e-12);
}

// S5 transform: integer input remapped through one category before being
// looked up in a second.
#[test]
fn s5_transform() {
    let set = load(json!({
        "schema_version": 2,
        "corrections": [{
            "name": "remap",
            "version": 1,
            "inputs": [{"name": "idx", "type": "int"}],
            "output": {"name": "weight", "type": "real"},
            "data": {
                "nodetype": "transform",
                "input": "idx",
                "rule": {
                    "nodetype": "category",
                    "input": "idx",
                    "content": [
                        {"key": 0, "value": 0},
                        {"key": 1, "value": 4},
                        {"key": 2, "value": 0},
                        {"key": 9, "value": 3.000001},
                        {"key": 10, "value": 2.999999}
                    ]
                },
                "content": {
                    "nodetype": "category",
                    "input": "idx",
                    "content": [
                        {"key": 0, "value": 0.0},
                        {"key": 3, "value": 0.1},
                        {"key": 4, "value": 0.2}
                    ]
                }
            }
        }]
    }));
    let corr = set.by_name("remap").unwrap();
    assert_eq!(
        correctionlib_core::evaluate(corr, &[Argument::Int(1)]).unwrap(),
        0.2
    );
    assert_eq!(
        correctionlib_core::evaluate(corr, &[Argument::Int(9)]).unwrap(),
        0.1
    );
    assert_eq!(
        correctionlib_core::evaluate(corr, &[Argument::Int(10)]).unwrap(),
        0.1
    );
    assert!(correctionlib_core::evaluate(corr, &[Argument::Int(3)]).is_err());
}

// S6 switch inclusive comparison.
#[test]
fn s6_switch_inclusive() {
    let set = load(json!({
        "schema_version": 2,
        "corrections": [{
            "name": "sw",
            "version": 1,
            "inputs": [{"name": "eta", "type": "real"}],
            "output": {"name": "weight", "type": "real"},
            "data": {
                "nodetype": "switch",
                "selections": [
                    {"variable": "eta", "op": "<=", "value": 3.0, "content": 1.0}
                ],
                "default": 0.0
            }
        }]
    }));
    assert_eq!(eval1(&set, "sw", vec![Argument::Real(3.0)]), 1.0);
    assert_eq!(eval1(&set, "sw", vec![Argument::Real(3.00001)]), 0.0);
}

// S7 compound correction.
#[test]
fn s7_compound() {
    let set = load(json!({
        "schema_version": 2,
        "corrections": [
            {
                "name": "l1",
                "version": 1,
                "inputs": [],
                "output": {"name": "w", "type": "real"},
                "data": 1.1
            },
            {
                "name": "l2",
                "version": 1,
                "inputs": [
                    {"name": "pt", "type": "real"},
                    {"name": "eta", "type": "real"}
                ],
                "output": {"name": "w", "type": "real"},
                "data": {
                    "nodetype": "formula",
                    "parser": "TFormula",
                    "expression": "1 + 0.1*log10(x) + 0.1*y",
                    "variables": ["pt", "eta"]
                }
            }
        ],
        "compound_corrections": [{
            "name": "compound",
            "inputs": [
                {"name": "pt", "type": "real"},
                {"name": "eta", "type": "real"}
            ],
            "output": {"name": "w", "type": "real"},
            "inputs_update": ["pt"],
            "input_op": "*",
            "output_op": "last",
            "stack": ["l1", "l2"]
        }]
    }));
    let compound = set.compound_by_name("compound").unwrap();
    let out = compound
        .evaluate(&set, &[Argument::Real(10.0), Argument::Real(1.2)])
        .unwrap();
    let expected = 1.0 + 0.1 * 11.0_f64.log10() + 0.1 * 1.2;
    assert!((out - expected).abs() < 1e-12);
}

// S8 multibinning: two axes, content laid out row-major (last axis
// fastest), flow firing globally when either axis lands out of range.
#[test]
fn s8_multibinning_2d_flow() {
    let set = load(json!({
        "schema_version": 2,
        "corrections": [{
            "name": "eff2d",
            "version": 1,
            "inputs": [
                {"name": "pt", "type": "real"},
                {"name": "eta", "type": "real"}
            ],
            "output": {"name": "weight", "type": "real"},
            "data": {
                "nodetype": "multibinning",
                "inputs": ["pt", "eta"],
                "edges": [
                    [0.0, 10.0, 20.0],
                    [-2.0, 0.0, 2.0]
                ],
                "content": [1.0, 2.0, 3.0, 4.0],
                "flow": "clamp"
            }
        }]
    }));
    let corr = set.by_name("eff2d").unwrap();
    // In range: pt bin 0, eta bin 1 -> row-major index 0*2+1 = 1.
    assert_eq!(
        correctionlib_core::evaluate(corr, &[Argument::Real(5.0), Argument::Real(1.0)]).unwrap(),
        2.0
    );
    // pt out of range (above), eta in range: flow clamps pt down to its
    // last bin while eta resolves normally, landing on index 1*2+1 = 3.
    assert_eq!(
        correctionlib_core::evaluate(corr, &[Argument::Real(1000.0), Argument::Real(1.0)]).unwrap(),
        4.0
    );

    let erroring = load(json!({
        "schema_version": 2,
        "corrections": [{
            "name": "eff2d_err",
            "version": 1,
            "inputs": [
                {"name": "pt", "type": "real"},
                {"name": "eta", "type": "real"}
            ],
            "output": {"name": "weight", "type": "real"},
            "data": {
                "nodetype": "multibinning",
                "inputs": ["pt", "eta"],
                "edges": [
                    [0.0, 10.0, 20.0],
                    [-2.0, 0.0, 2.0]
                ],
                "content": [1.0, 2.0, 3.0, 4.0],
                "flow": "error"
            }
        }]
    }));
    let corr_err = erroring.by_name("eff2d_err").unwrap();
    // Only one axis out of range is enough to trigger the flow policy.
    assert!(
        correctionlib_core::evaluate(corr_err, &[Argument::Real(1000.0), Argument::Real(1.0)])
            .is_err()
    );
    assert!(
        correctionlib_core::evaluate(corr_err, &[Argument::Real(5.0), Argument::Real(1.0)]).is_ok()
    );
}

// S9 formularef: a correction whose data is a bare reference into the
// correction's own generic_formulas table.
#[test]
fn s9_formularef_into_generic_formulas() {
    let set = load(json!({
        "schema_version": 2,
        "corrections": [{
            "name": "scaled",
            "version": 1,
            "inputs": [{"name": "x", "type": "real"}],
            "output": {"name": "y", "type": "real"},
            "generic_formulas": [
                {
                    "parser": "TFormula",
                    "expression": "x*[0]",
                    "variables": ["x"]
                }
            ],
            "data": {
                "nodetype": "formularef",
                "index": 0,
                "parameters": [2.5]
            }
        }]
    }));
    assert_eq!(eval1(&set, "scaled", vec![Argument::Real(4.0)]), 10.0);
}

// Property 1: edge monotonicity is rejected at load time, not eval time.
#[test]
fn property1_non_monotonic_edges_rejected_at_load() {
    let result = CorrectionSet::from_json_default(&json!({
        "schema_version": 2,
        "corrections": [{
            "name": "bad",
            "version": 1,
            "inputs": [{"name": "x", "type": "real"}],
            "output": {"name": "y", "type": "real"},
            "data": {
                "nodetype": "binning",
                "input": "x",
                "edges": [10.0, 5.0, 20.0],
                "content": [1.0, 2.0],
                "flow": "error"
            }
        }]
    }));
    assert!(result.is_err());
}

// Property 2: shape consistency between edges and content is checked.
#[test]
fn property2_binning_shape_mismatch_rejected() {
    let result = CorrectionSet::from_json_default(&json!({
        "schema_version": 2,
        "corrections": [{
            "name": "bad",
            "version": 1,
            "inputs": [{"name": "x", "type": "real"}],
            "output": {"name": "y", "type": "real"},
            "data": {
                "nodetype": "binning",
                "input": "x",
                "edges": [10.0, 20.0, 30.0],
                "content": [1.0],
                "flow": "error"
            }
        }]
    }));
    assert!(result.is_err());
}

// Property 3: reference closure, an unknown input name is rejected.
#[test]
fn property3_unknown_input_reference_rejected() {
    let result = CorrectionSet::from_json_default(&json!({
        "schema_version": 2,
        "corrections": [{
            "name": "bad",
            "version": 1,
            "inputs": [{"name": "x", "type": "real"}],
            "output": {"name": "y", "type": "real"},
            "data": {
                "nodetype": "binning",
                "input": "not_x",
                "edges": [10.0, 20.0],
                "content": [1.0],
                "flow": "error"
            }
        }]
    }));
    assert!(result.is_err());
}

// Property 4: duplicate correction names across a set are rejected.
#[test]
fn property4_duplicate_correction_names_rejected() {
    let result = CorrectionSet::from_json_default(&json!({
        "schema_version": 2,
        "corrections": [
            {
                "name": "dup",
                "version": 1,
                "inputs": [],
                "output": {"name": "y", "type": "real"},
                "data": 1.0
            },
            {
                "name": "dup",
                "version": 1,
                "inputs": [],
                "output": {"name": "y", "type": "real"},
                "data": 2.0
            }
        ]
    }));
    assert!(result.is_err());
}

// Property 5: load-evaluate round trip through a hand-written re-serializer
// that inverts the loader's schema for the node kinds exercised here.
mod resave {
    use correctionlib_core::{Category, CategoryKeys, Content, Correction, CorrectionSet, Edges, Flow};
    use serde_json::{Value, json};

    pub fn set_to_json(set: &CorrectionSet) -> Value {
        json!({
            "schema_version": set.schema_version,
            "corrections": set.corrections.iter().map(correction_to_json).collect::<Vec<_>>(),
        })
    }

    fn correction_to_json(c: &Correction) -> Value {
        json!({
            "name": c.name,
            "version": c.version,
            "inputs": c.inputs.iter().map(|v| json!({"name": v.name, "type": v.value_type.to_string()})).collect::<Vec<_>>(),
            "output": {"name": c.output.name, "type": c.output.value_type.to_string()},
            "data": content_to_json(&c.data, c),
        })
    }

    fn edges_to_json(e: &Edges) -> Value {
        match e {
            Edges::Uniform { n, low, high } => json!({"n": n, "low": low, "high": high}),
            Edges::NonUniform(v) => json!(v),
        }
    }

    fn flow_to_json(f: &Flow, c: &Correction) -> Value {
        match f {
            Flow::Clamp => json!("clamp"),
            Flow::Error => json!("error"),
            Flow::Wrap => json!("wrap"),
            Flow::Content(inner) => content_to_json(inner, c),
        }
    }

    fn content_to_json(node: &Content, c: &Correction) -> Value {
        match node {
            Content::Constant(v) => json!(v),
            Content::Binning(b) => json!({
                "nodetype": "binning",
                "input": c.inputs[b.input].name,
                "edges": edges_to_json(&b.edges),
                "content": b.content.iter().map(|n| content_to_json(n, c)).collect::<Vec<_>>(),
                "flow": flow_to_json(&b.flow, c),
            }),
            Content::Category(cat) => category_to_json(cat, c),
            _ => panic!("round-trip fixture exercises only constant/binning/category nodes"),
        }
    }

    fn category_to_json(cat: &Category, c: &Correction) -> Value {
        let content = match &cat.keys {
            CategoryKeys::Int(entries) => entries
                .iter()
                .map(|(k, v)| json!({"key": k, "value": content_to_json(v, c)}))
                .collect::<Vec<_>>(),
            CategoryKeys::Str { entries, .. } => entries
                .iter()
                .map(|(k, v)| json!({"key": k, "value": content_to_json(v, c)}))
                .collect::<Vec<_>>(),
        };
        json!({
            "nodetype": "category",
            "input": c.inputs[cat.input].name,
            "content": content,
            "default": cat.default.as_deref().map(|d| content_to_json(d, c)),
        })
    }
}

#[test]
fn property5_load_evaluate_round_trip() {
    let fixture = json!({
        "schema_version": 2,
        "corrections": [{
            "name": "pt_weight",
            "version": 1,
            "inputs": [{"name": "pt", "type": "real"}],
            "output": {"name": "weight", "type": "real"},
            "data": {
                "nodetype": "binning",
                "input": "pt",
                "edges": [10.0, 20.0, 30.0, 40.0, 50.0, 80.0, 120.0],
                "content": [1.1, 1.08, 1.06, 1.04, 1.02, 1.0],
                "flow": "clamp"
            }
        }]
    });
    let once = load(fixture);
    let resaved = resave::set_to_json(&once);
    let twice = CorrectionSet::from_json_default(&resaved).unwrap();

    for pt in [1.2_f64, 15.0, 35.0, 1000.0] {
        let a = eval1(&once, "pt_weight", vec![Argument::Real(pt)]);
        let b = eval1(&twice, "pt_weight", vec![Argument::Real(pt)]);
        assert_eq!(a, b);
    }
}

// Property 6: scalar/batch equivalence.
#[test]
fn property6_scalar_batch_equivalence() {
    let set = load(json!({
        "schema_version": 2,
        "corrections": [{
            "name": "pt_weight",
            "version": 1,
            "inputs": [{"name": "pt", "type": "real"}],
            "output": {"name": "weight", "type": "real"},
            "data": {
                "nodetype": "binning",
                "input": "pt",
                "edges": [10.0, 20.0, 30.0, 40.0, 50.0, 80.0, 120.0],
                "content": [1.1, 1.08, 1.06, 1.04, 1.02, 1.0],
                "flow": "clamp"
            }
        }]
    }));
    let corr = set.by_name("pt_weight").unwrap();
    let pts = vec![1.2, 15.0, 45.0, 1000.0];
    let batch = correctionlib_core::evalv(
        corr,
        &[correctionlib_core::BatchInput::Real(pts.clone())],
    )
    .unwrap();
    for (i, &pt) in pts.iter().enumerate() {
        let scalar = correctionlib_core::evaluate(corr, &[Argument::Real(pt)]).unwrap();
        assert_eq!(batch[i], scalar);
    }
}

// Property 7: flow semantics at the exact clamp boundaries.
#[test]
fn property7_clamp_flow_at_boundaries() {
    let set = load(json!({
        "schema_version": 2,
        "corrections": [{
            "name": "c",
            "version": 1,
            "inputs": [{"name": "x", "type": "real"}],
            "output": {"name": "y", "type": "real"},
            "data": {
                "nodetype": "binning",
                "input": "x",
                "edges": [0.0, 1.0, 2.0, 3.0],
                "content": [10.0, 20.0, 30.0],
                "flow": "clamp"
            }
        }]
    }));
    assert_eq!(eval1(&set, "c", vec![Argument::Real(-5.0)]), 10.0);
    assert_eq!(eval1(&set, "c", vec![Argument::Real(2.999999)]), 30.0);
}

// Property 8: PRNG determinism, re-checked end to end through the loader.
#[test]
fn property8_hashprng_determinism_through_loader() {
    let set = load(json!({
        "schema_version": 2,
        "corrections": [{
            "name": "smear",
            "version": 1,
            "inputs": [{"name": "pt", "type": "real"}, {"name": "eta", "type": "real"}],
            "output": {"name": "factor", "type": "real"},
            "data": {
                "nodetype": "hashprng",
                "inputs": ["pt", "eta"],
                "distribution": "stdflat"
            }
        }]
    }));
    let corr = set.by_name("smear").unwrap();
    let a = correctionlib_core::evaluate(corr, &[Argument::Real(30.0), Argument::Real(1.1)]).unwrap();
    let b = correctionlib_core::evaluate(corr, &[Argument::Real(30.0), Argument::Real(1.1)]).unwrap();
    assert_eq!(a, b);
    let c = correctionlib_core::evaluate(corr, &[Argument::Real(31.0), Argument::Real(1.1)]).unwrap();
    assert_ne!(a, c);
}
