use mirvcs::eval::{evaluate, evaluate_voc, iou_key, EvaluateConfig, ABSENT};
use mirvcs::model::{AnnotationSet, AssetId, BBox, ClassId, ConfusionMatrixType, ObjectAnnotation};

fn set(entries: Vec<(&str, Vec<ObjectAnnotation>)>) -> AnnotationSet {
    let mut set = AnnotationSet::default();
    for (asset, objects) in entries {
        set.image_annotations.insert(AssetId::new(asset), objects);
    }
    set
}

fn bbox() -> BBox {
    BBox::from_xyxy(10.0, 10.0, 50.0, 50.0)
}

fn config(conf_thr: f64, iou_thrs: Vec<f64>) -> EvaluateConfig {
    EvaluateConfig {
        conf_thr,
        iou_thrs,
        need_pr_curve: true,
        class_ids: Vec::new(),
    }
}

/// a0: prediction on top of its ground truth; a1: a prediction with no
/// ground truth at all. Everything is class 3.
fn two_assets() -> (AnnotationSet, AnnotationSet) {
    let pred = set(vec![
        ("a0", vec![ObjectAnnotation::new(0, 3, bbox()).with_score(0.9)]),
        ("a1", vec![ObjectAnnotation::new(0, 3, bbox()).with_score(0.6)]),
    ]);
    let gt = set(vec![("a0", vec![ObjectAnnotation::new(0, 3, bbox())])]);
    (pred, gt)
}

#[test]
fn two_asset_scenario_coco() {
    let (pred, gt) = two_assets();
    let out = evaluate(&pred, &gt, &config(0.3, vec![0.5])).expect("evaluate");
    let class = &out.evaluation.iou_evaluations[&iou_key(0.5)].ci_evaluations[&ClassId(3)];

    assert_eq!((class.tp, class.fp, class.fn_count), (1, 1, 0));
    assert!((class.ap - 1.0).abs() < 1e-9, "ap {}", class.ap);
    assert!((class.ar - 1.0).abs() < 1e-9, "ar {}", class.ar);
    assert!(!class.pr_curve.is_empty());
    assert!((out.evaluation.map() - 1.0).abs() < 1e-9);

    let a0 = AssetId::new("a0");
    let a1 = AssetId::new("a1");
    assert_eq!(out.prediction.objects(&a0)[0].cm, ConfusionMatrixType::Tp);
    assert_eq!(out.prediction.objects(&a0)[0].det_link_id, Some(0));
    assert_eq!(out.prediction.objects(&a1)[0].cm, ConfusionMatrixType::Fp);
    assert_eq!(out.ground_truth.objects(&a0)[0].cm, ConfusionMatrixType::Mtp);
}

#[test]
fn two_asset_scenario_voc() {
    let (pred, gt) = two_assets();
    let single = evaluate_voc(&pred, &gt, &config(0.3, vec![0.5])).expect("evaluate");
    let class = &single.ci_evaluations[&ClassId(3)];

    assert_eq!((class.tp, class.fp, class.fn_count), (1, 1, 0));
    assert!((class.ap - 1.0).abs() < 1e-9, "ap {}", class.ap);
}

#[test]
fn false_positive_ranked_first_lowers_ap() {
    let pred = set(vec![
        ("a0", vec![ObjectAnnotation::new(0, 3, bbox()).with_score(0.5)]),
        ("a1", vec![ObjectAnnotation::new(0, 3, bbox()).with_score(0.9)]),
    ]);
    let gt = set(vec![("a0", vec![ObjectAnnotation::new(0, 3, bbox())])]);
    let out = evaluate(&pred, &gt, &config(0.3, vec![0.5])).expect("evaluate");
    let class = &out.evaluation.iou_evaluations[&iou_key(0.5)].ci_evaluations[&ClassId(3)];

    // Precision envelope is 0.5 across the whole recall grid.
    assert!((class.ap - 0.5).abs() < 1e-9, "ap {}", class.ap);
}

#[test]
fn identical_box_scores_one_at_every_threshold() {
    let pred = set(vec![("a", vec![ObjectAnnotation::new(0, 1, bbox()).with_score(1.0)])]);
    let gt = set(vec![("a", vec![ObjectAnnotation::new(0, 1, bbox())])]);
    let thrs = vec![0.5, 0.75, 0.95, 1.0];
    let out = evaluate(&pred, &gt, &config(0.0, thrs.clone())).expect("evaluate");

    for thr in thrs {
        let class = &out.evaluation.iou_evaluations[&iou_key(thr)].ci_evaluations[&ClassId(1)];
        assert_eq!((class.tp, class.fp, class.fn_count), (1, 0, 0), "iou {thr}");
        assert!((class.ap - 1.0).abs() < 1e-9, "iou {thr}");
    }
    assert!((out.evaluation.iou_averaged.ci_averaged.ap - 1.0).abs() < 1e-9);
}

#[test]
fn no_predictions_scores_zero() {
    let gt = set(vec![("a", vec![ObjectAnnotation::new(0, 1, bbox())])]);
    let out = evaluate(&AnnotationSet::default(), &gt, &config(0.0, vec![0.5])).expect("evaluate");
    let class = &out.evaluation.iou_evaluations[&iou_key(0.5)].ci_evaluations[&ClassId(1)];

    assert_eq!(class.ap, 0.0);
    assert_eq!(class.ar, 0.0);
    assert_eq!(class.fn_count, 1);
    assert_eq!(out.ground_truth.objects(&AssetId::new("a"))[0].cm, ConfusionMatrixType::Fn);
}

#[test]
fn class_without_ground_truth_is_absent() {
    let (pred, gt) = two_assets();
    let mut cfg = config(0.3, vec![0.5]);
    cfg.class_ids = vec![ClassId(3), ClassId(7)];
    let out = evaluate(&pred, &gt, &cfg).expect("evaluate");
    let single = &out.evaluation.iou_evaluations[&iou_key(0.5)];

    assert_eq!(single.ci_evaluations[&ClassId(7)].ap, ABSENT);
    assert_eq!(single.ci_evaluations[&ClassId(7)].ar, ABSENT);
    // Absent classes do not drag the average down.
    assert!((single.ci_averaged.ap - 1.0).abs() < 1e-9);
}

#[test]
fn low_confidence_predictions_are_ignored() {
    let (pred, gt) = two_assets();
    // a1's false positive (0.6) drops below the threshold.
    let out = evaluate(&pred, &gt, &config(0.7, vec![0.5])).expect("evaluate");
    let class = &out.evaluation.iou_evaluations[&iou_key(0.5)].ci_evaluations[&ClassId(3)];

    assert_eq!((class.tp, class.fp), (1, 0));
    assert_eq!(
        out.prediction.objects(&AssetId::new("a1"))[0].cm,
        ConfusionMatrixType::Ignored
    );
}

#[test]
fn shifted_box_matches_only_at_low_thresholds() {
    // 40x40 boxes offset by 10 on x: IoU = 1200 / 2000 = 0.6.
    let pred = set(vec![(
        "a",
        vec![ObjectAnnotation::new(0, 1, BBox::from_xyxy(20.0, 10.0, 60.0, 50.0)).with_score(0.8)],
    )]);
    let gt = set(vec![("a", vec![ObjectAnnotation::new(0, 1, bbox())])]);
    let out = evaluate(&pred, &gt, &config(0.0, vec![0.5, 0.7])).expect("evaluate");

    let at = |thr: f64| &out.evaluation.iou_evaluations[&iou_key(thr)].ci_evaluations[&ClassId(1)];
    assert_eq!(at(0.5).tp, 1);
    assert_eq!(at(0.7).tp, 0);
    assert_eq!(at(0.7).fp, 1);
    let averaged = &out.evaluation.iou_averaged.ci_evaluations[&ClassId(1)];
    assert!((averaged.ap - 0.5).abs() < 1e-9, "ap {}", averaged.ap);
}
