/// Asserts that `$value` matches the snapshot stored next to the fixture at
/// `$fixture_path`, named after the fixture's file stem.
#[macro_export]
macro_rules! snap_test {
    ($value:expr, $fixture_path:expr) => {
        let fixture_path = ::std::path::Path::new($fixture_path);
        let fixture_dir = fixture_path.parent().unwrap();
        let fixture_name = fixture_path.file_stem().unwrap().to_str().unwrap();

        let mut settings = insta::Settings::new();
        settings.set_snapshot_path(fixture_dir);
        settings.set_input_file($fixture_path);
        settings.set_prepend_module_to_snapshot(false);
        settings.set_omit_expression(true);

        let text: String = $value;
        settings.bind(|| {
            insta::_macro_support::assert_snapshot(
                (fixture_name.to_string(), text.as_str()).into(),
                std::path::Path::new(env!("CARGO_MANIFEST_DIR")),
                fixture_name,
                module_path!(),
                file!(),
                line!(),
                &text,
            )
            .unwrap()
        })
    };
}
