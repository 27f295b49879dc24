#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use zendispatch::ImageRequest;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    target: &'a str,
    first: u16,
    second: u16,
}

fuzz_target!(|input: Input<'_>| {
    let request = ImageRequest::new(input.target);
    let _ = request.prefix();
    let _ = request.extension();
    assert!(request.target().ends_with(request.path()));

    let a = request.frame_target(usize::from(input.first));
    let b = request.frame_target(usize::from(input.second));
    if input.first != input.second {
        assert_ne!(a, b, "frame names collide for {:?}", input.target);
    }
});
