#![no_main]

use libfuzzer_sys::fuzz_target;
use plsp_wire::{
    ErrorReply, FrameHeader, InvokeRequest, NestedCall, NestedReply, Opcode, ResultReply,
    Unpacker,
};

fuzz_target!(|data: &[u8]| {
    let data = if data.len() > 64 * 1024 {
        &data[..64 * 1024]
    } else {
        data
    };

    let mut u = Unpacker::new(data);
    let Ok(header) = FrameHeader::unpack(&mut u) else {
        return;
    };
    match header.opcode() {
        Ok(Opcode::Invoke) => {
            let _ = InvokeRequest::unpack(&mut u);
        }
        Ok(Opcode::Result) => {
            let _ = ResultReply::unpack(&mut u);
            let _ = NestedReply::unpack(&mut Unpacker::new(&data[u.position()..]));
        }
        Ok(Opcode::Error) => {
            let _ = ErrorReply::unpack(&mut u);
        }
        Ok(Opcode::NestedCallback) => {
            let _ = NestedCall::unpack(&mut u);
        }
        _ => {}
    }
});
