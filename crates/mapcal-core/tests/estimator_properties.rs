use approx::assert_abs_diff_eq;
use mapcal_core::{
    estimate_affine, fit_transform, AffineTransform, EstimateError, Point2, TransformModel,
};
use nalgebra::{Matrix2, Vector2};

fn max_abs_diff(a: &AffineTransform, b: &AffineTransform) -> f64 {
    (a.matrix() - b.matrix()).abs().max()
}

fn transforms() -> Vec<AffineTransform> {
    vec![
        AffineTransform::identity(),
        AffineTransform::new(Matrix2::new(0.1, 0.0, 0.0, 0.1), Vector2::zeros()),
        AffineTransform::new(Matrix2::new(0.0, -1.0, 1.0, 0.0), Vector2::new(5.0, -2.0)),
        AffineTransform::new(
            Matrix2::new(2.0, 0.7, -0.3, 0.5),
            Vector2::new(-410.0, 77.25),
        ),
        // Mirror with shear, as produced by a y-down drawing frame.
        AffineTransform::new(
            Matrix2::new(0.02, 0.001, 0.0005, -0.02),
            Vector2::new(-3.1, 9.8),
        ),
    ]
}

fn floor_plan_points() -> Vec<Point2<f64>> {
    vec![
        Point2::new(12.0, 40.0),
        Point2::new(610.0, 35.0),
        Point2::new(598.0, 455.0),
        Point2::new(20.0, 470.0),
        Point2::new(300.0, 250.0),
        Point2::new(150.0, 390.0),
    ]
}

#[test]
fn noise_free_correspondences_recover_every_transform() {
    let src = floor_plan_points();
    for t in transforms() {
        let dst: Vec<_> = src.iter().map(|&p| t.apply(p)).collect();

        let est = estimate_affine(&src, &dst).expect("estimate");
        assert!(max_abs_diff(&est, &t) <= 1e-9, "{t}\nvs\n{est}");

        let minimal = estimate_affine(&src[..3], &dst[..3]).expect("estimate");
        assert!(max_abs_diff(&minimal, &t) <= 1e-9, "{t}\nvs\n{minimal}");
    }
}

#[test]
fn consistent_permutation_gives_same_fit() {
    let t = transforms()[3];
    let src = floor_plan_points();
    let dst: Vec<_> = src
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let q = t.apply(p);
            // Deterministic perturbation so the fit is a true least-squares one.
            Point2::new(q.x + 0.3 * (i as f64).sin(), q.y - 0.2 * (i as f64).cos())
        })
        .collect();

    let base = estimate_affine(&src, &dst).expect("estimate");

    let order = [4, 1, 5, 0, 3, 2];
    let src_p: Vec<_> = order.iter().map(|&i| src[i]).collect();
    let dst_p: Vec<_> = order.iter().map(|&i| dst[i]).collect();
    let permuted = estimate_affine(&src_p, &dst_p).expect("estimate");

    assert!(max_abs_diff(&base, &permuted) <= 1e-9);
}

#[test]
fn repeated_estimation_is_bit_identical() {
    let t = transforms()[4];
    let src = floor_plan_points();
    let dst: Vec<_> = src.iter().map(|&p| t.apply(p)).collect();

    let a = estimate_affine(&src, &dst).expect("estimate");
    let b = estimate_affine(&src, &dst).expect("estimate");
    assert_eq!(a.to_array(), b.to_array());
}

#[test]
fn collinear_points_never_yield_a_transform() {
    let src: Vec<_> = (0..5)
        .map(|i| Point2::new(3.0 + 2.0 * i as f64, -1.0 + 0.5 * i as f64))
        .collect();
    let dst = floor_plan_points()[..5].to_vec();

    assert_eq!(
        estimate_affine(&src, &dst),
        Err(EstimateError::DegenerateGeometry)
    );
    assert_eq!(
        estimate_affine(&src[..3], &dst[..3]),
        Err(EstimateError::DegenerateGeometry)
    );
}

#[test]
fn ten_to_one_scale_down() {
    let map = [
        Point2::new(0.0, 0.0),
        Point2::new(10.0, 0.0),
        Point2::new(0.0, 10.0),
    ];
    let real = [
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(0.0, 1.0),
    ];

    let t = estimate_affine(&map, &real).expect("estimate");
    let linear = t.linear();
    assert_abs_diff_eq!(linear[(0, 0)], 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(linear[(1, 1)], 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(linear[(0, 1)], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(linear[(1, 0)], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(t.translation().norm(), 0.0, epsilon = 1e-12);
}

#[test]
fn affine_model_beats_similarity_on_sheared_data() {
    let t = transforms()[3];
    let src = floor_plan_points();
    let dst: Vec<_> = src.iter().map(|&p| t.apply(p)).collect();

    let affine = fit_transform(&src, &dst, TransformModel::Affine).expect("affine");
    let similarity = fit_transform(&src, &dst, TransformModel::Similarity).expect("similarity");
    assert!(affine.rms_residual < 1e-9);
    assert!(similarity.rms_residual > affine.rms_residual);
}
